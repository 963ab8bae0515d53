//! Modal G-code translator for the DeskCNC controller
//!
//! Holds the modal state of the program and turns each command into device
//! frames. Positions sent to the device are `position + offset`: after a
//! restart the controller's zero is wherever the tool stopped, so the offset
//! is set to the negated logical position at the time of the fault.

use super::executor::CommandExecutor;
use super::frame::DeviceCommand;
use deskcnc_core::{
    ControllerError, DistanceMode, Error, GcodeError, MotionMode, Plane, Position, Result,
    SpindleState, Units,
};
use deskcnc_gcode::{Block, GCode, GCodeKind, GcodeParser, ModalState, Word};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Fastest linear interpolation the machine supports (mm/min)
pub const MAX_LINEAR_FEED_RATE: f64 = 1620.0;

/// Counters for a streamed program
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Lines taken from the reader
    pub lines_read: u32,
    /// Non-empty lines that ran to completion
    pub lines_executed: u32,
    /// Lines abandoned after the device rejected a command
    pub lines_skipped: u32,
    /// Session restarts performed to recover from faults
    pub faults_recovered: u32,
    /// Stopped early by the interrupt flag
    pub interrupted: bool,
}

/// DeskCNC G-code translator
#[derive(Debug)]
pub struct DeskCncController {
    executor: CommandExecutor,
    state: ModalState,
    offset: Position,
    max_linear_feed_rate: f64,
    spindle_settle: Duration,
    max_consecutive_faults: Option<u32>,
    faults_recovered: u32,
}

impl DeskCncController {
    /// Create a translator with default modal state
    pub fn new(executor: CommandExecutor) -> Self {
        Self {
            executor,
            state: ModalState::default(),
            offset: Position::ZERO,
            max_linear_feed_rate: MAX_LINEAR_FEED_RATE,
            spindle_settle: Duration::from_secs(2),
            max_consecutive_faults: None,
            faults_recovered: 0,
        }
    }

    /// Start from a given modal state
    pub fn with_modal_state(mut self, state: ModalState) -> Self {
        self.state = state;
        self
    }

    /// Override the linear feed clamp
    pub fn with_max_linear_feed_rate(mut self, feed_rate: f64) -> Self {
        self.max_linear_feed_rate = feed_rate;
        self
    }

    /// Wait after each spindle command
    pub fn with_spindle_settle(mut self, settle: Duration) -> Self {
        self.spindle_settle = settle;
        self
    }

    /// Tolerate at most this many faults in a row (`None` retries forever)
    pub fn with_max_consecutive_faults(mut self, limit: Option<u32>) -> Self {
        self.max_consecutive_faults = limit;
        self
    }

    /// Modal state
    pub fn state(&self) -> &ModalState {
        &self.state
    }

    /// Compensation added to every outgoing position
    pub fn offset(&self) -> Position {
        self.offset
    }

    /// Session restarts performed for fault recovery
    pub fn faults_recovered(&self) -> u32 {
        self.faults_recovered
    }

    /// Command executor
    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Command executor, mutably
    pub fn executor_mut(&mut self) -> &mut CommandExecutor {
        &mut self.executor
    }

    /// Initial bring-up
    pub fn connect(&mut self) -> Result<()> {
        self.executor.session_mut().restart()
    }

    /// Apply a position or feed word to the modal state
    pub fn apply_word(&mut self, word: &Word) {
        self.state.apply_word(word);
    }

    /// Execute one command, recovering from transport faults
    ///
    /// The modal position is rolled back before each retry so incremental
    /// parameters are not applied twice.
    pub fn dispatch(&mut self, command: &GCode) -> Result<()> {
        let before = self.state.position;
        let mut faults = 0;
        loop {
            match self.dispatch_once(command) {
                Err(err) if err.is_connection_error() => {
                    faults += 1;
                    tracing::error!("Communication error during {}: {}", command, err);
                    self.check_fault_limit(faults)?;
                    let at_fault = self.state.position;
                    self.state.position = before;
                    faults = self.recover(at_fault, faults)?;
                }
                result => return result,
            }
        }
    }

    /// Run every command of a parsed line
    pub fn execute_block(&mut self, block: &Block) -> Result<()> {
        self.state.apply_words(&block.modal_params);

        for command in block.sorted_commands() {
            self.dispatch(command)?;
        }

        if block.repeats_motion() {
            let repeat = GCode::motion(self.state.motion_mode);
            tracing::debug!("Repeating modal {}", repeat);
            self.dispatch(&repeat)?;
        }
        Ok(())
    }

    /// Run a whole program from `reader`
    ///
    /// `stop` is checked between lines; a line already started completes.
    pub fn stream<R: BufRead>(&mut self, reader: R, stop: &AtomicBool) -> Result<StreamSummary> {
        let mut parser = GcodeParser::new();
        let mut summary = StreamSummary::default();

        for line in reader.lines() {
            if stop.load(Ordering::SeqCst) {
                tracing::info!("Interrupted after {} lines", summary.lines_read);
                summary.interrupted = true;
                break;
            }
            let line = line?;
            summary.lines_read += 1;

            let block = parser.parse(&line)?;
            if block.is_empty() {
                continue;
            }

            let span = tracing::debug_span!("line", number = parser.line_count());
            let _guard = span.enter();
            tracing::debug!("{}", line.trim());

            match self.execute_block(&block) {
                Ok(()) => summary.lines_executed += 1,
                Err(err) if err.is_protocol_error() => {
                    tracing::error!("Skipping line {}: {}", parser.line_count(), err);
                    summary.lines_skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        summary.faults_recovered = self.faults_recovered;
        Ok(summary)
    }

    fn dispatch_once(&mut self, command: &GCode) -> Result<()> {
        self.state.apply_words(&command.params);

        match command.kind {
            GCodeKind::FeedRate => {}
            GCodeKind::RapidMove => {
                let target = self.machine_target();
                self.executor.execute(&DeviceCommand::RapidMove { target })?;
                self.state.motion_mode = MotionMode::Rapid;
            }
            GCodeKind::LinearMove => {
                if self.state.feed_rate > self.max_linear_feed_rate {
                    tracing::warn!(
                        "Feed rate {} exceeds machine limit, clamping to {}",
                        self.state.feed_rate,
                        self.max_linear_feed_rate
                    );
                    self.state.feed_rate = self.max_linear_feed_rate;
                }
                let target = self.machine_target();
                self.executor.execute(&DeviceCommand::LinearMove {
                    target,
                    feed_rate: self.state.feed_rate,
                })?;
                self.state.motion_mode = MotionMode::Linear;
            }
            GCodeKind::ArcMoveCw | GCodeKind::ArcMoveCcw => {
                return Err(unsupported(command, "circular interpolation is not available"))
            }
            GCodeKind::SelectXyPlane => self.select_plane(command, Plane::XY)?,
            GCodeKind::SelectZxPlane => self.select_plane(command, Plane::ZX)?,
            GCodeKind::SelectYzPlane => self.select_plane(command, Plane::YZ)?,
            GCodeKind::UseInches => self.select_units(command, Units::INCH)?,
            GCodeKind::UseMillimeters => self.select_units(command, Units::MM)?,
            GCodeKind::AbsoluteDistance => self.state.distance_mode = DistanceMode::Absolute,
            GCodeKind::IncrementalDistance => {
                self.state.distance_mode = DistanceMode::Incremental
            }
            GCodeKind::UnitsPerMinute => tracing::debug!("G94 is the default feed mode"),
            GCodeKind::StartSpindleCw => {
                self.switch_spindle(true)?;
                self.state.spindle = SpindleState::Cw;
            }
            GCodeKind::StartSpindleCcw => {
                tracing::warn!("M4 is not supported by the hardware, spinning clockwise");
                self.switch_spindle(true)?;
                self.state.spindle = SpindleState::Ccw;
            }
            GCodeKind::StopSpindle => {
                self.switch_spindle(false)?;
                self.state.spindle = SpindleState::Off;
            }
            GCodeKind::CoolantOff => tracing::warn!("M9 is not supported by the hardware"),
            GCodeKind::Other(_) => tracing::warn!("Unsupported command {}, ignoring", command),
        }
        Ok(())
    }

    fn select_plane(&mut self, command: &GCode, plane: Plane) -> Result<()> {
        if plane != Plane::XY {
            let reason = format!("only the XY plane is available, not {}", plane);
            return Err(unsupported(command, &reason));
        }
        self.state.plane = plane;
        Ok(())
    }

    fn select_units(&mut self, command: &GCode, units: Units) -> Result<()> {
        if units != Units::MM {
            let reason = format!("only mm coordinates are available, not {}", units);
            return Err(unsupported(command, &reason));
        }
        self.state.units = units;
        Ok(())
    }

    /// Restart until the device is ready again and the spindle restored
    fn recover(&mut self, at_fault: Position, mut faults: u32) -> Result<u32> {
        loop {
            self.executor.session_mut().restart()?;
            self.offset = -at_fault;
            self.faults_recovered += 1;
            tracing::info!("Device restarted, position offset {}", self.offset);

            if !self.state.spindle.is_running() {
                return Ok(faults);
            }
            match self.switch_spindle(true) {
                Ok(()) => return Ok(faults),
                Err(err) if err.is_connection_error() => {
                    faults += 1;
                    tracing::error!("Communication error restoring spindle: {}", err);
                    self.check_fault_limit(faults)?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn check_fault_limit(&self, faults: u32) -> Result<()> {
        match self.max_consecutive_faults {
            Some(limit) if faults > limit => {
                Err(ControllerError::TooManyFaults { count: faults }.into())
            }
            _ => Ok(()),
        }
    }

    fn switch_spindle(&mut self, on: bool) -> Result<()> {
        self.executor.execute(&DeviceCommand::Spindle { on })?;
        std::thread::sleep(self.spindle_settle);
        Ok(())
    }

    fn machine_target(&self) -> Position {
        self.state.position + self.offset
    }
}

fn unsupported(command: &GCode, reason: &str) -> Error {
    GcodeError::Unsupported {
        command: command.kind.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
