//! SampleTranslator: turns touch samples into protocol events.
//!
//! # Coordinate scaling
//!
//! Surface coordinates are clamped to `[0, size]` and scaled onto
//! `0..=65534` (`2 * i16::MAX`).  The result is truncated to `i32` and then
//! narrowed to `i16`, so the upper half of the surface lands on negative
//! `i16` values; the encoder reinterprets them as unsigned, which restores
//! the full 16-bit range on the wire.  Pressure is clamped to `[0, 2]` and
//! scaled by `i16::MAX`, wrapping the same way.
//!
//! # Proximity tracking
//!
//! Receivers treat button id `-1` as "tool in range".  A stylus announces
//! range itself through hover enter/exit.  Fingers (and styluses on screens
//! without hover) touch down without ever hovering, so the translator
//! synthesises a proximity press before the contact and the matching
//! release after it:
//!
//! ```text
//! OutOfRange ──hover enter──► InRange ──hover exit──► OutOfRange
//!     │
//!     └──down──► FakeInRange ──up/cancel──► OutOfRange
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::sample::{ButtonMask, SampleAction, ToolType, TouchSample};
use crate::protocol::messages::{
    ProtocolEvent, BUTTON_CONTACT, BUTTON_PROXIMITY, BUTTON_STYLUS_PRIMARY,
    BUTTON_STYLUS_SECONDARY,
};

/// Upper bound of the normalised pressure input.
const MAX_PRESSURE_INPUT: f32 = 2.0;

/// Scale factor mapping a full surface span onto the 16-bit space.
const COORDINATE_SPAN: f32 = 2.0 * i16::MAX as f32;

/// Size of the input surface in the same units as sample coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl Default for SurfaceSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeStatus {
    OutOfRange,
    InRange,
    /// Proximity was synthesised for a contact that never hovered.
    FakeInRange,
}

/// Stateful translator from [`TouchSample`]s to [`ProtocolEvent`]s.
#[derive(Debug, Clone)]
pub struct SampleTranslator {
    surface: SurfaceSize,
    stylus_only: bool,
    range: RangeStatus,
    side_buttons: [bool; 2],
}

impl SampleTranslator {
    /// Creates a translator for a surface of the given size.
    ///
    /// With `stylus_only` set, samples from any tool other than a stylus are
    /// dropped.
    pub fn new(surface: SurfaceSize, stylus_only: bool) -> Self {
        Self {
            surface,
            stylus_only,
            range: RangeStatus::OutOfRange,
            side_buttons: [false; 2],
        }
    }

    /// Updates the surface size after a resize.
    pub fn set_surface(&mut self, surface: SurfaceSize) {
        self.surface = surface;
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    pub fn set_stylus_only(&mut self, stylus_only: bool) {
        self.stylus_only = stylus_only;
    }

    /// Translates one sample into zero or more events, in transmission order.
    pub fn translate(&mut self, sample: &TouchSample) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        if self.stylus_only && sample.tool != ToolType::Stylus {
            return events;
        }

        let x = scale_coordinate(sample.x, self.surface.width);
        let y = scale_coordinate(sample.y, self.surface.height);
        let pressure = scale_pressure(sample.pressure);

        if sample.tool == ToolType::Stylus {
            self.detect_side_buttons(sample.buttons, x, y, pressure, &mut events);
        }

        let button = |button_id: i8, pressure: i16, down: bool| ProtocolEvent::Button {
            x,
            y,
            pressure,
            button_id,
            down,
        };

        match sample.action {
            SampleAction::HoverMove | SampleAction::Move => {
                events.push(ProtocolEvent::Motion { x, y, pressure });
            }
            SampleAction::HoverEnter => {
                self.range = RangeStatus::InRange;
                events.push(button(BUTTON_PROXIMITY, pressure, true));
            }
            SampleAction::HoverExit => {
                self.range = RangeStatus::OutOfRange;
                events.push(button(BUTTON_PROXIMITY, pressure, false));
            }
            SampleAction::Down => {
                if self.range == RangeStatus::OutOfRange {
                    self.range = RangeStatus::FakeInRange;
                    events.push(button(BUTTON_PROXIMITY, 0, true));
                }
                events.push(button(BUTTON_CONTACT, pressure, true));
            }
            SampleAction::Up | SampleAction::Cancel => {
                events.push(button(BUTTON_CONTACT, pressure, false));
                if self.range == RangeStatus::FakeInRange {
                    self.range = RangeStatus::OutOfRange;
                    events.push(button(BUTTON_PROXIMITY, 0, false));
                }
            }
        }
        events
    }

    fn detect_side_buttons(
        &mut self,
        mask: ButtonMask,
        x: i16,
        y: i16,
        pressure: i16,
        events: &mut Vec<ProtocolEvent>,
    ) {
        let buttons = [
            (ButtonMask::STYLUS_PRIMARY, BUTTON_STYLUS_PRIMARY),
            (ButtonMask::STYLUS_SECONDARY, BUTTON_STYLUS_SECONDARY),
        ];
        for (slot, (flag, button_id)) in buttons.into_iter().enumerate() {
            let now = mask.contains(flag);
            if now != self.side_buttons[slot] {
                self.side_buttons[slot] = now;
                events.push(ProtocolEvent::Button {
                    x,
                    y,
                    pressure,
                    button_id,
                    down: now,
                });
            }
        }
    }
}

impl Default for SampleTranslator {
    fn default() -> Self {
        Self::new(SurfaceSize::default(), false)
    }
}

/// Scales a surface coordinate onto the 16-bit wire space.
pub fn scale_coordinate(value: f32, size: u32) -> i16 {
    if size == 0 {
        return 0;
    }
    let max = size as f32;
    // `as i32` truncates toward zero; `as i16` keeps the low 16 bits.
    (value.clamp(0.0, max) * COORDINATE_SPAN / max) as i32 as i16
}

/// Scales a normalised pressure onto the 16-bit wire space.
pub fn scale_pressure(value: f32) -> i16 {
    (value.clamp(0.0, MAX_PRESSURE_INPUT) * i16::MAX as f32) as i32 as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> SampleTranslator {
        SampleTranslator::new(
            SurfaceSize {
                width: 1000,
                height: 500,
            },
            false,
        )
    }

    fn finger(action: SampleAction, x: f32, y: f32, pressure: f32) -> TouchSample {
        TouchSample {
            tool: ToolType::Finger,
            ..TouchSample::stylus(action, x, y, pressure)
        }
    }

    fn ids(events: &[ProtocolEvent]) -> Vec<(i8, bool)> {
        events
            .iter()
            .filter_map(|e| match *e {
                ProtocolEvent::Button { button_id, down, .. } => Some((button_id, down)),
                _ => None,
            })
            .collect()
    }

    // ── Scaling ───────────────────────────────────────────────────────────────

    #[test]
    fn test_scale_coordinate_endpoints() {
        assert_eq!(scale_coordinate(0.0, 1000), 0);
        // Full span = 65534, which narrows to -2 and travels as 0xFFFE.
        assert_eq!(scale_coordinate(1000.0, 1000), -2);
        assert_eq!(scale_coordinate(1000.0, 1000) as u16, 65534);
    }

    #[test]
    fn test_scale_coordinate_midpoint() {
        assert_eq!(scale_coordinate(500.0, 1000), i16::MAX);
    }

    #[test]
    fn test_scale_coordinate_clamps_out_of_surface_values() {
        assert_eq!(scale_coordinate(-50.0, 1000), 0);
        assert_eq!(scale_coordinate(5000.0, 1000), scale_coordinate(1000.0, 1000));
    }

    #[test]
    fn test_scale_coordinate_zero_surface_is_zero() {
        assert_eq!(scale_coordinate(10.0, 0), 0);
    }

    #[test]
    fn test_scale_pressure() {
        assert_eq!(scale_pressure(0.0), 0);
        assert_eq!(scale_pressure(1.0), i16::MAX);
        assert_eq!(scale_pressure(-1.0), 0);
        assert_eq!(scale_pressure(2.0) as u16, 65534);
        assert_eq!(scale_pressure(9.0), scale_pressure(2.0));
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    #[test]
    fn test_hover_move_becomes_motion() {
        let mut t = translator();
        let events = t.translate(&TouchSample::stylus(SampleAction::HoverMove, 500.0, 250.0, 0.0));
        assert_eq!(
            events,
            vec![ProtocolEvent::Motion {
                x: i16::MAX,
                y: i16::MAX,
                pressure: 0
            }]
        );
    }

    #[test]
    fn test_hover_enter_and_exit_toggle_proximity() {
        let mut t = translator();
        let enter = t.translate(&TouchSample::stylus(SampleAction::HoverEnter, 1.0, 1.0, 0.0));
        let exit = t.translate(&TouchSample::stylus(SampleAction::HoverExit, 1.0, 1.0, 0.0));
        assert_eq!(ids(&enter), vec![(-1, true)]);
        assert_eq!(ids(&exit), vec![(-1, false)]);
    }

    #[test]
    fn test_hovering_stylus_down_does_not_synthesise_proximity() {
        let mut t = translator();
        t.translate(&TouchSample::stylus(SampleAction::HoverEnter, 1.0, 1.0, 0.0));
        let down = t.translate(&TouchSample::stylus(SampleAction::Down, 1.0, 1.0, 0.5));
        let up = t.translate(&TouchSample::stylus(SampleAction::Up, 1.0, 1.0, 0.0));
        assert_eq!(ids(&down), vec![(0, true)]);
        assert_eq!(ids(&up), vec![(0, false)]);
    }

    #[test]
    fn test_finger_contact_synthesises_proximity_around_contact() {
        // Arrange
        let mut t = translator();

        // Act
        let down = t.translate(&finger(SampleAction::Down, 10.0, 10.0, 1.0));
        let up = t.translate(&finger(SampleAction::Up, 10.0, 10.0, 1.0));

        // Assert
        assert_eq!(ids(&down), vec![(-1, true), (0, true)]);
        assert_eq!(ids(&up), vec![(0, false), (-1, false)]);
        // Synthetic proximity carries zero pressure.
        assert!(matches!(down[0], ProtocolEvent::Button { pressure: 0, .. }));
        assert!(matches!(up[1], ProtocolEvent::Button { pressure: 0, .. }));
        assert!(matches!(down[1], ProtocolEvent::Button { pressure: i16::MAX, .. }));
    }

    #[test]
    fn test_cancel_releases_like_up() {
        let mut t = translator();
        t.translate(&finger(SampleAction::Down, 1.0, 1.0, 1.0));
        let cancel = t.translate(&finger(SampleAction::Cancel, 1.0, 1.0, 1.0));
        assert_eq!(ids(&cancel), vec![(0, false), (-1, false)]);
    }

    // ── Side buttons ──────────────────────────────────────────────────────────

    #[test]
    fn test_side_button_transitions_precede_action() {
        // Arrange
        let mut t = translator();
        let mut pressed = TouchSample::stylus(SampleAction::HoverMove, 1.0, 1.0, 0.0);
        pressed.buttons = ButtonMask(ButtonMask::STYLUS_PRIMARY | ButtonMask::STYLUS_SECONDARY);

        // Act
        let first = t.translate(&pressed);
        let held = t.translate(&pressed);
        let released = t.translate(&TouchSample::stylus(SampleAction::HoverMove, 1.0, 1.0, 0.0));

        // Assert
        assert_eq!(ids(&first), vec![(1, true), (2, true)]);
        assert!(matches!(first[2], ProtocolEvent::Motion { .. }));
        assert!(ids(&held).is_empty(), "no transition while held");
        assert_eq!(ids(&released), vec![(1, false), (2, false)]);
    }

    #[test]
    fn test_side_buttons_ignored_for_non_stylus_tools() {
        let mut t = translator();
        let mut sample = finger(SampleAction::Move, 1.0, 1.0, 1.0);
        sample.buttons = ButtonMask(ButtonMask::STYLUS_PRIMARY);
        let events = t.translate(&sample);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ProtocolEvent::Motion { .. }));
    }

    // ── Filtering and resize ──────────────────────────────────────────────────

    #[test]
    fn test_stylus_only_drops_other_tools() {
        let mut t = translator();
        t.set_stylus_only(true);
        assert!(t.translate(&finger(SampleAction::Move, 1.0, 1.0, 1.0)).is_empty());
        assert_eq!(
            t.translate(&TouchSample::stylus(SampleAction::Move, 1.0, 1.0, 1.0)).len(),
            1
        );
    }

    #[test]
    fn test_set_surface_rescales() {
        let mut t = translator();
        t.set_surface(SurfaceSize {
            width: 2000,
            height: 1000,
        });
        let events = t.translate(&TouchSample::stylus(SampleAction::Move, 1000.0, 500.0, 0.0));
        assert_eq!(
            events,
            vec![ProtocolEvent::Motion {
                x: i16::MAX,
                y: i16::MAX,
                pressure: 0
            }]
        );
    }
}
