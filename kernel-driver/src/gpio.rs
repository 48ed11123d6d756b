//! GPIO lines: the consumer API and an in-memory chip.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::device::lock;
use crate::error::GpioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioDirection {
    Input,
    Output,
}

/// Consumer side of a GPIO controller (`gpio_request`, `gpio_get_value`, ...).
pub trait GpioChip: Send + Sync {
    fn request(&self, line: u32, label: &str) -> Result<(), GpioError>;
    fn free(&self, line: u32);
    fn direction_input(&self, line: u32) -> Result<(), GpioError>;
    fn direction_output(&self, line: u32, value: bool) -> Result<(), GpioError>;
    fn get_value(&self, line: u32) -> Result<bool, GpioError>;
    fn set_value(&self, line: u32, value: bool) -> Result<(), GpioError>;
}

struct Claim {
    label: String,
    direction: Option<GpioDirection>,
}

#[derive(Default)]
struct Lines {
    claims: BTreeMap<u32, Claim>,
    levels: BTreeMap<u32, bool>,
}

/// Chip with `count` lines whose input levels a test can drive.
pub struct SimGpio {
    count: u32,
    lines: Mutex<Lines>,
}

impl SimGpio {
    pub fn new(count: u32) -> Self {
        Self {
            count,
            lines: Mutex::new(Lines::default()),
        }
    }

    /// Set what an input line reads as.
    pub fn drive_input(&self, line: u32, level: bool) {
        lock(&self.lines).levels.insert(line, level);
    }

    /// Current level of a line, as driven or as last set by its output.
    pub fn level(&self, line: u32) -> bool {
        lock(&self.lines).levels.get(&line).copied().unwrap_or(false)
    }

    pub fn label(&self, line: u32) -> Option<String> {
        lock(&self.lines).claims.get(&line).map(|c| c.label.clone())
    }

    pub fn direction(&self, line: u32) -> Option<GpioDirection> {
        lock(&self.lines).claims.get(&line).and_then(|c| c.direction)
    }

    fn check(&self, line: u32) -> Result<(), GpioError> {
        if line < self.count {
            Ok(())
        } else {
            Err(GpioError::InvalidLine(line))
        }
    }

    fn set_direction(&self, line: u32, direction: GpioDirection) -> Result<(), GpioError> {
        let mut lines = lock(&self.lines);
        let claim = lines
            .claims
            .get_mut(&line)
            .ok_or(GpioError::NotRequested(line))?;
        claim.direction = Some(direction);
        Ok(())
    }
}

impl GpioChip for SimGpio {
    fn request(&self, line: u32, label: &str) -> Result<(), GpioError> {
        self.check(line)?;
        let mut lines = lock(&self.lines);
        if lines.claims.contains_key(&line) {
            return Err(GpioError::Busy(line));
        }
        lines.claims.insert(
            line,
            Claim {
                label: label.to_owned(),
                direction: None,
            },
        );
        Ok(())
    }

    fn free(&self, line: u32) {
        lock(&self.lines).claims.remove(&line);
    }

    fn direction_input(&self, line: u32) -> Result<(), GpioError> {
        self.set_direction(line, GpioDirection::Input)
    }

    fn direction_output(&self, line: u32, value: bool) -> Result<(), GpioError> {
        self.set_direction(line, GpioDirection::Output)?;
        lock(&self.lines).levels.insert(line, value);
        Ok(())
    }

    fn get_value(&self, line: u32) -> Result<bool, GpioError> {
        self.check(line)?;
        let lines = lock(&self.lines);
        if !lines.claims.contains_key(&line) {
            return Err(GpioError::NotRequested(line));
        }
        Ok(lines.levels.get(&line).copied().unwrap_or(false))
    }

    fn set_value(&self, line: u32, value: bool) -> Result<(), GpioError> {
        let mut lines = lock(&self.lines);
        match lines.claims.get(&line).map(|c| c.direction) {
            None => return Err(GpioError::NotRequested(line)),
            Some(Some(GpioDirection::Output)) => {}
            Some(_) => return Err(GpioError::NotOutput(line)),
        }
        lines.levels.insert(line, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_exclusive_and_bounded() {
        let chip = SimGpio::new(28);
        chip.request(4, "rpi-gpio-4").unwrap();
        assert_eq!(chip.request(4, "again"), Err(GpioError::Busy(4)));
        assert_eq!(chip.request(40, "nope"), Err(GpioError::InvalidLine(40)));
        assert_eq!(chip.label(4).as_deref(), Some("rpi-gpio-4"));

        chip.free(4);
        chip.request(4, "again").unwrap();
    }

    #[test]
    fn only_outputs_can_be_set() {
        let chip = SimGpio::new(28);
        chip.request(17, "in").unwrap();
        chip.direction_input(17).unwrap();
        assert_eq!(chip.set_value(17, true), Err(GpioError::NotOutput(17)));

        chip.request(4, "out").unwrap();
        chip.direction_output(4, false).unwrap();
        chip.set_value(4, true).unwrap();
        assert!(chip.level(4));
    }

    #[test]
    fn inputs_read_the_driven_level() {
        let chip = SimGpio::new(28);
        chip.request(17, "in").unwrap();
        chip.direction_input(17).unwrap();
        assert!(!chip.get_value(17).unwrap());
        chip.drive_input(17, true);
        assert!(chip.get_value(17).unwrap());
    }
}
