//! Session/driver loop
//!
//! One cooperative loop per radio: wait for bytes (bounded by the read
//! timeout), feed the frame codec, dispatch frames to the grid model or the
//! localization and mode control steps, and publish the results. Everything
//! runs on the loop's own thread. Other threads talk to it only through a
//! [`DriverHandle`].

pub mod handshake;

use crate::algorithms::localization::{LocalizationEngine, Mounting, RelativePosition};
use crate::api::bus::Publisher;
use crate::api::types::{
    ActuatorControls, BusMessage, LandingTargetPose, OffboardControlMode, UwbDistance, UwbGrid, VehicleStatus,
};
use crate::control::{ControlOutput, FollowLimits, ModeController};
use crate::core::constants::{PARAM_REFRESH_INTERVAL, READ_TIMEOUT, SILENT_WINDOWS_BEFORE_WARNING};
use crate::core::types::{DistanceFrame, DriverMode, GridFrame};
use crate::hardware::{CommError, CommResult, RecoveryStrategy, TransceiverInterface};
use crate::processing::{Frame, FrameCodec};
use crate::utils::config::DriverParameters;
use crate::utils::grid::{AnchorGrid, GridError};
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Updates handed to the loop from other threads
#[derive(Debug, Clone)]
pub enum DriverInput {
    /// New parameter snapshot, applied at the next refresh
    Parameters(DriverParameters),
    /// Vehicle arming/navigation status, applied immediately
    VehicleStatus(VehicleStatus),
    /// Replacement grid
    Grid(Box<GridFrame>),
}

/// Cloneable control handle for a running driver
#[derive(Debug, Clone)]
pub struct DriverHandle {
    stop: Arc<AtomicBool>,
    inputs: Sender<DriverInput>,
}

impl DriverHandle {
    /// Ask the loop to close the session and exit
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Queue an update; false once the driver is gone
    pub fn send(&self, input: DriverInput) -> bool {
        self.inputs.send(input).is_ok()
    }

    pub fn update_parameters(&self, params: DriverParameters) -> bool {
        self.send(DriverInput::Parameters(params))
    }

    pub fn update_vehicle_status(&self, status: VehicleStatus) -> bool {
        self.send(DriverInput::VehicleStatus(status))
    }

    pub fn load_grid(&self, grid: GridFrame) -> bool {
        self.send(DriverInput::Grid(Box::new(grid)))
    }
}

/// Read, error and drop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub reads: u64,
    pub read_errors: u64,
    pub bytes_received: u64,
    pub distance_frames: u64,
    pub grid_frames: u64,
    pub frames_rejected: u64,
    pub unknown_anchor: u64,
    pub no_position: u64,
    pub positions: u64,
    pub handshake_failures: u64,
    pub publish_failures: u64,
    pub silent_windows: u64,
}

/// UWB guidance driver
pub struct UwbDriver<T: TransceiverInterface, P: Publisher> {
    link: T,
    publisher: P,
    codec: FrameCodec,
    grid: AnchorGrid,
    engine: LocalizationEngine,
    control: ModeController,
    params: Arc<DriverParameters>,
    pending: Option<DriverParameters>,
    limits: FollowLimits,
    mode_override: Option<DriverMode>,
    position_debug: bool,
    inputs: Receiver<DriverInput>,
    stop: Arc<AtomicBool>,
    session_open: bool,
    needs_reset: bool,
    started: Instant,
    last_refresh: Instant,
    silent_streak: u32,
    last_position: Option<RelativePosition>,
    stats: DriverStats,
    read_buf: Vec<u8>,
}

impl<T: TransceiverInterface, P: Publisher> UwbDriver<T, P> {
    pub fn new(link: T, publisher: P, params: DriverParameters) -> (Self, DriverHandle) {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let now = Instant::now();

        let mut driver = Self {
            link,
            publisher,
            codec: FrameCodec::new(),
            grid: AnchorGrid::new(),
            engine: LocalizationEngine::default(),
            control: ModeController::new(params.mode),
            limits: FollowLimits::from_parameters(&params),
            params: Arc::new(params.clone()),
            pending: None,
            mode_override: None,
            position_debug: false,
            inputs: rx,
            stop: stop.clone(),
            session_open: false,
            needs_reset: false,
            started: now,
            last_refresh: now,
            silent_streak: 0,
            last_position: None,
            stats: DriverStats::default(),
            read_buf: vec![0u8; 256],
        };
        driver.apply_parameters(params);

        (driver, DriverHandle { stop, inputs: tx })
    }

    /// Mode that wins over the parameter file
    pub fn with_mode_override(mut self, mode: Option<DriverMode>) -> Self {
        self.mode_override = mode;
        if let Some(mode) = mode {
            self.control.configure(mode);
        }
        self
    }

    /// Log every computed relative position
    pub fn with_position_debug(mut self, enabled: bool) -> Self {
        self.position_debug = enabled;
        self
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn parameters(&self) -> Arc<DriverParameters> {
        self.params.clone()
    }

    pub fn grid(&self) -> &AnchorGrid {
        &self.grid
    }

    pub fn is_session_open(&self) -> bool {
        self.session_open
    }

    /// Latest relative position estimate
    pub fn last_position(&self) -> Option<&RelativePosition> {
        self.last_position.as_ref()
    }

    /// Mode currently in force after the safety and grid fallbacks
    pub fn effective_mode(&self) -> DriverMode {
        self.control.effective_mode(self.grid.is_loaded())
    }

    pub fn link(&self) -> &T {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut T {
        &mut self.link
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    fn timestamp(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.started).as_micros() as u64
    }

    /// Install a grid. A refused grid leaves the active one untouched.
    pub fn load_grid(&mut self, frame: GridFrame) -> Result<(), GridError> {
        self.load_grid_at(frame, Instant::now())
    }

    fn load_grid_at(&mut self, frame: GridFrame, now: Instant) -> Result<(), GridError> {
        let summary = UwbGrid::from_frame(&frame, self.timestamp(now));
        self.grid.load(frame)?;
        self.refresh_mounting();
        self.publish(BusMessage::UwbGrid(summary));
        Ok(())
    }

    fn refresh_mounting(&mut self) {
        let params = &self.params;
        let mounting = Mounting::new(
            params.mounting_offset() + self.grid.target_offset(),
            params.init_yaw,
            params.init_pitch,
        );
        self.engine.set_mounting(mounting);
    }

    fn apply_parameters(&mut self, params: DriverParameters) {
        if params.serial_port.is_some() && params.serial_port != self.params.serial_port {
            warn!(
                "serial_port changed to {:?}; takes effect after restart",
                params.serial_port
            );
        }

        self.control.configure(self.mode_override.unwrap_or(params.mode));
        self.engine.set_min_fom(params.min_aoa_fom);
        self.limits = FollowLimits::from_parameters(&params);
        self.params = Arc::new(params);
        self.refresh_mounting();
    }

    fn drain_inputs(&mut self, now: Instant) {
        while let Ok(input) = self.inputs.try_recv() {
            match input {
                DriverInput::Parameters(params) => self.pending = Some(params),
                DriverInput::VehicleStatus(status) => {
                    if status != self.control.vehicle_status() {
                        debug!("Vehicle status {:?}", status);
                    }
                    self.control.set_vehicle_status(status);
                }
                DriverInput::Grid(frame) => {
                    if let Err(e) = self.load_grid_at(*frame, now) {
                        warn!("Ignoring grid update: {}", e);
                    }
                }
            }
        }

        if now.saturating_duration_since(self.last_refresh) >= PARAM_REFRESH_INTERVAL {
            self.last_refresh = now;
            if let Some(params) = self.pending.take() {
                debug!("Applying refreshed parameters");
                self.apply_parameters(params);
            }
        }
    }

    /// Open a ranging session in the configured mode
    pub fn start_session(&mut self) -> CommResult<()> {
        let mode = self.control.begin_session();
        match handshake::send_sequence(&mut self.link, &handshake::start_sequence(mode)) {
            Ok(()) => {
                self.session_open = true;
                self.codec.clear();
                info!("UWB session started in {} mode", mode);
                Ok(())
            }
            Err(e) => {
                self.control.end_session();
                self.stats.handshake_failures += 1;
                Err(e)
            }
        }
    }

    /// Close the ranging session
    pub fn stop_session(&mut self) -> CommResult<()> {
        self.session_open = false;
        self.control.end_session();
        let result = handshake::send_sequence(&mut self.link, &handshake::stop_sequence());
        match &result {
            Ok(()) => info!("UWB session stopped"),
            Err(_) => self.stats.handshake_failures += 1,
        }
        result
    }

    fn handle_link_error(&mut self, e: &CommError) {
        match e.recovery_strategy() {
            RecoveryStrategy::ResetAndRetry => {
                self.needs_reset = true;
                self.session_open = false;
                self.control.end_session();
            }
            RecoveryStrategy::RetryWithDelay { delay_ms } => {
                thread::sleep(Duration::from_millis(delay_ms as u64));
            }
            RecoveryStrategy::Retry => {}
            RecoveryStrategy::Fail => {
                error!("Unrecoverable link error: {}", e);
                thread::sleep(READ_TIMEOUT);
            }
        }
    }

    /// Reopen the link and drop whatever was buffered before the loss
    fn reset_link(&mut self) -> CommResult<()> {
        self.link.reset()?;
        if let Err(e) = self.link.flush() {
            warn!("UWB input flush failed: {}", e);
        }
        self.codec.clear();
        self.needs_reset = false;
        Ok(())
    }

    /// One scheduling pass
    pub fn tick(&mut self, now: Instant) {
        self.drain_inputs(now);

        if self.session_open && self.control.configured_mode() != self.control.latched_mode() {
            info!(
                "Restarting UWB session for mode {}",
                self.control.configured_mode()
            );
            if let Err(e) = self.stop_session() {
                warn!("UWB stop handshake failed: {}", e);
            }
        }

        if !self.session_open {
            if self.needs_reset || !self.link.is_connected() {
                if let Err(e) = self.reset_link() {
                    warn!("UWB link reset failed: {}", e);
                    return;
                }
            }
            if let Err(e) = self.start_session() {
                warn!("UWB start handshake failed, retrying: {}", e);
                self.handle_link_error(&e);
                return;
            }
        }

        let mut produced = false;
        match self.link.read_bytes(&mut self.read_buf, READ_TIMEOUT) {
            Ok(0) => {
                self.stats.silent_windows += 1;
                self.silent_streak += 1;
                if self.silent_streak == SILENT_WINDOWS_BEFORE_WARNING {
                    warn!("UWB module is not responding");
                }
            }
            Ok(n) => {
                self.stats.reads += 1;
                self.stats.bytes_received += n as u64;
                self.silent_streak = 0;
                self.codec.push(&self.read_buf[..n]);
                produced = self.drain_frames(now);
            }
            Err(e) => {
                self.stats.read_errors += 1;
                warn!("UWB read failed: {}", e);
                self.handle_link_error(&e);
            }
        }

        if !produced {
            if let Some(output) = self.control.tick(self.grid.is_loaded(), now) {
                self.emit(output, now);
            }
        }
    }

    /// Decode every complete frame; true if a position reached the controller
    fn drain_frames(&mut self, now: Instant) -> bool {
        let mut produced = false;
        while let Some(result) = self.codec.next_frame() {
            match result {
                Ok(Frame::Distance(frame)) => produced |= self.handle_distance(frame, now),
                Ok(Frame::Grid(frame)) => {
                    self.stats.grid_frames += 1;
                    if let Err(e) = self.load_grid_at(*frame, now) {
                        warn!("Rejected grid frame: {}", e);
                    }
                }
                Err(e) => {
                    self.stats.frames_rejected += 1;
                    debug!("Dropped frame: {}", e);
                }
            }
        }
        produced
    }

    fn handle_distance(&mut self, frame: DistanceFrame, now: Instant) -> bool {
        self.stats.distance_frames += 1;
        let measurement = frame.measurement;

        let anchor = if self.grid.is_loaded() {
            match self.grid.anchor_position(measurement.mac) {
                Some(anchor) => Some(anchor),
                None => {
                    self.stats.unknown_anchor += 1;
                    debug!("Measurement from unknown anchor {}", measurement.mac);
                    return false;
                }
            }
        } else {
            None
        };

        let position = self
            .engine
            .localize(&measurement)
            .map(|p| match anchor {
                Some(anchor) => p.translated(anchor),
                None => p,
            });

        let mode = self.control.effective_mode(self.grid.is_loaded());
        let distance = UwbDistance {
            timestamp_us: self.timestamp(now),
            counter: frame.seq_ctr,
            session_id: frame.session_id,
            time_offset: frame.range_interval,
            mac: measurement.mac.as_u16(),
            status: mode.status_code(),
            distance_m: measurement.distance_cm as f64 / 100.0,
            nlos: measurement.nlos,
            aoa_azimuth_dev: measurement.azimuth_deg(),
            aoa_elevation_dev: measurement.elevation_deg(),
            aoa_azimuth_resp: measurement.dest_azimuth_deg(),
            aoa_elevation_resp: measurement.dest_elevation_deg(),
            position: position.map(|p| {
                let m = p.position_m();
                [m.x, m.y, m.z]
            }),
        };
        self.publish(BusMessage::UwbDistance(distance));

        let Some(position) = position else {
            self.stats.no_position += 1;
            return false;
        };

        self.stats.positions += 1;
        if self.position_debug {
            info!(
                "UWB {} pos ({:.1}, {:.1}, {:.1}) cm range {:.0} cm az {:.1} el {:.1}",
                measurement.mac,
                position.position.x,
                position.position.y,
                position.position.z,
                position.range_cm,
                position.azimuth_deg,
                position.elevation_deg
            );
        }
        self.last_position = Some(position);

        let output = self
            .control
            .update(&position, &self.limits, self.grid.is_loaded(), now);
        self.emit(output, now);
        true
    }

    fn emit(&mut self, output: ControlOutput, now: Instant) {
        let timestamp_us = self.timestamp(now);
        match output {
            ControlOutput::Idle => {}
            ControlOutput::LandingTarget { position_m, valid } => {
                self.publish(BusMessage::LandingTargetPose(LandingTargetPose {
                    timestamp_us,
                    rel_pos_valid: valid,
                    x_rel: position_m.x,
                    y_rel: position_m.y,
                    z_rel: position_m.z,
                }));
            }
            ControlOutput::Follow { command, actuate } => {
                self.publish(BusMessage::OffboardControlMode(OffboardControlMode {
                    timestamp_us,
                    actuator: true,
                }));
                if actuate {
                    self.publish(BusMessage::ActuatorControls(ActuatorControls {
                        timestamp_us,
                        yaw: command.heading,
                        thrust: command.throttle,
                    }));
                }
            }
        }
    }

    fn publish(&mut self, message: BusMessage) {
        let topic = message.topic();
        if let Err(e) = self.publisher.publish(message) {
            self.stats.publish_failures += 1;
            warn!("Publishing {} failed: {}", topic, e);
        }
    }

    /// Run until stopped, then close the session
    pub fn run(&mut self) {
        info!("UWB driver running");
        while !self.stop.load(Ordering::SeqCst) {
            let now = Instant::now();
            let was_open = self.session_open;
            self.tick(now);
            if !was_open && !self.session_open {
                // handshake did not go through; read_bytes was not reached
                thread::sleep(READ_TIMEOUT);
            }
        }

        if self.session_open {
            if let Err(e) = self.stop_session() {
                warn!("UWB stop handshake failed: {}", e);
            }
        }
        info!("UWB driver stopped: {:?}", self.stats);
        info!("UWB link: {:?}", self.link.get_status());
    }
}
