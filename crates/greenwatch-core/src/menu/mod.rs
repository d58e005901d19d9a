//! Serial menu state machine
//!
//! Keystrokes move the menu between the top level, the report pages and the
//! settings editor. Drawing is left to a [`Render`] implementation: the menu
//! only tracks which page is active and whether it needs to be drawn again.

mod view;

pub use view::*;

use log::{debug, info};

use crate::config::{LOG_DEPTH_RANGE, SAMPLE_INTERVAL_RANGE, SettingRange};
use crate::storage::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    TemperatureCurrent,
    TemperatureLog,
    PressureCurrent,
    PressureLog,
    LightCurrent,
    LightLog,
    FullCurrent,
}

impl ReportKind {
    /// Report bound to a top-level digit.
    const fn from_key(key: u8) -> Option<Self> {
        match key {
            b'1' => Some(Self::TemperatureCurrent),
            b'2' => Some(Self::TemperatureLog),
            b'3' => Some(Self::PressureCurrent),
            b'4' => Some(Self::PressureLog),
            b'5' => Some(Self::LightCurrent),
            b'6' => Some(Self::LightLog),
            b'7' => Some(Self::FullCurrent),
            _ => None,
        }
    }
}

/// Runtime-editable setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    SampleInterval,
    LogDepth,
}

impl SettingField {
    pub const fn range(self) -> SettingRange {
        match self {
            Self::SampleInterval => SAMPLE_INTERVAL_RANGE,
            Self::LogDepth => LOG_DEPTH_RANGE,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::SampleInterval => "logging interval",
            Self::LogDepth => "log size",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    Top,
    Report(ReportKind),
    Settings,
    Edit(SettingField),
}

/// What the renderer has to draw for a menu state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderAction {
    TopMenu,
    Current(Channel),
    Log(Channel),
    FullReport,
    Settings,
    Edit(SettingField),
}

impl MenuState {
    pub const fn render_action(&self) -> RenderAction {
        match self {
            Self::Top => RenderAction::TopMenu,
            Self::Report(kind) => match kind {
                ReportKind::TemperatureCurrent => RenderAction::Current(Channel::Temperature),
                ReportKind::TemperatureLog => RenderAction::Log(Channel::Temperature),
                ReportKind::PressureCurrent => RenderAction::Current(Channel::Pressure),
                ReportKind::PressureLog => RenderAction::Log(Channel::Pressure),
                ReportKind::LightCurrent => RenderAction::Current(Channel::Light),
                ReportKind::LightLog => RenderAction::Log(Channel::Light),
                ReportKind::FullCurrent => RenderAction::FullReport,
            },
            Self::Settings => RenderAction::Settings,
            Self::Edit(field) => RenderAction::Edit(*field),
        }
    }

    /// Whether the page shows live readings and should follow every refresh.
    pub const fn shows_live_values(&self) -> bool {
        matches!(
            self,
            Self::Report(
                ReportKind::TemperatureCurrent
                    | ReportKind::PressureCurrent
                    | ReportKind::LightCurrent
                    | ReportKind::FullCurrent
            )
        )
    }
}

/// A committed edit the owner of the configuration has to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange {
    SampleInterval(u16),
    LogDepth(u16),
}

/// Draws menu pages.
pub trait Render {
    type Error;

    fn render(&mut self, action: RenderAction, view: &MenuView<'_>) -> Result<(), Self::Error>;
}

pub struct Menu {
    state: MenuState,
    needs_redraw: bool,
}

impl Default for Menu {
    fn default() -> Self {
        Self::new()
    }
}

impl Menu {
    /// Start at the top level with a pending draw.
    pub const fn new() -> Self {
        Self {
            state: MenuState::Top,
            needs_redraw: true,
        }
    }

    pub const fn state(&self) -> MenuState {
        self.state
    }

    pub const fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    pub fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn transition(&mut self, next: MenuState) {
        debug!("Menu: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.needs_redraw = true;
    }

    /// Handle one chunk of received serial input.
    ///
    /// Outside the editors only the first non-blank byte counts. In an editor
    /// the whole chunk is one value; anything outside the field's range is
    /// ignored and the editor stays open.
    pub fn handle_input(&mut self, input: &[u8]) -> Option<SettingChange> {
        let input = input.trim_ascii();
        let key = *input.first()?;

        if matches!(key, b'x' | b'X') && input.len() == 1 && self.state != MenuState::Top {
            self.transition(MenuState::Top);
            return None;
        }

        match self.state {
            MenuState::Top => {
                if key == b'8' {
                    self.transition(MenuState::Settings);
                } else if let Some(kind) = ReportKind::from_key(key) {
                    self.transition(MenuState::Report(kind));
                }
                None
            }
            MenuState::Report(_) => None,
            MenuState::Settings => {
                match key {
                    b'1' => self.transition(MenuState::Edit(SettingField::SampleInterval)),
                    b'2' => self.transition(MenuState::Edit(SettingField::LogDepth)),
                    _ => {}
                }
                None
            }
            MenuState::Edit(field) => {
                let value = parse_value(input)?;
                if !field.range().contains(value) {
                    debug!("Menu: rejected {} for {}", value, field.label());
                    return None;
                }

                info!("Menu: {} set to {}", field.label(), value);
                self.transition(MenuState::Settings);
                Some(match field {
                    SettingField::SampleInterval => SettingChange::SampleInterval(value),
                    SettingField::LogDepth => SettingChange::LogDepth(value),
                })
            }
        }
    }

    /// Draw the current page if it is dirty. Returns whether anything was drawn.
    pub fn render<R: Render>(
        &mut self,
        renderer: &mut R,
        view: &MenuView<'_>,
    ) -> Result<bool, R::Error> {
        if !self.needs_redraw {
            return Ok(false);
        }
        renderer.render(self.state.render_action(), view)?;
        self.needs_redraw = false;
        Ok(true)
    }
}

fn parse_value(input: &[u8]) -> Option<u16> {
    core::str::from_utf8(input).ok()?.parse().ok()
}
