use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

mod callback;
mod config;
mod constants;
mod decoder;
mod driver_threads;
mod error;
mod frame;
pub mod input;
#[cfg(feature = "pcap")]
mod pcap_input;
mod queue;
mod thread_pool;
mod time;
mod udp_input;

use crate::callback::CallbackRegistry;
pub use crate::callback::{ExceptionCallback, PacketCallback, PointsCallback, ScanCallback};
pub use crate::config::{DecoderParam, DriverParam, InputParam, SplitFrameMode};
pub use crate::decoder::{DecodeStatus, Decoder};
use crate::driver_threads::{receive_packets, Pipeline};
pub use crate::error::DriverError;
use crate::frame::FrameHeader;
use crate::input::{create_input, Input};
pub use crate::thread_pool::ThreadPool;
use log::{error, info};
use rslidar_data::{ErrCode, LidarPacketMsg, LidarPointsMsg, LidarScanMsg};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

/// Receives packets from an [`Input`], decodes them with `D` and delivers
/// complete frames to the registered callbacks.
///
/// ```no_run
/// # fn run<D: rslidar_driver::Decoder>() -> Result<(), rslidar_driver::DriverError> {
/// use rslidar_driver::{DriverParam, LidarDriver};
///
/// let mut driver = LidarDriver::<D>::new();
/// driver.register_points_callback(|msg| println!("{} points", msg.points.len()));
/// driver.init(DriverParam::default())?;
/// driver.start()?;
/// # Ok(())
/// # }
/// ```
pub struct LidarDriver<D: Decoder> {
    state: DriverState,
    callbacks: Arc<CallbackRegistry<D::Point>>,
    pipeline: Option<Arc<Pipeline<D>>>,
    param: DriverParam,
    input: Option<Box<dyn Input>>,
    ingestion_thread: Option<JoinHandle<Box<dyn Input>>>,
}

impl<D: Decoder> LidarDriver<D> {
    pub fn new() -> Self {
        LidarDriver {
            state: DriverState::Uninitialized,
            callbacks: Arc::new(CallbackRegistry::new()),
            pipeline: None,
            param: DriverParam::default(),
            input: None,
            ingestion_thread: None,
        }
    }

    /// Creates the decoder and opens the input described by `param`.
    ///
    /// A stopped driver can be initialized again; its previous input is
    /// closed first. Registered callbacks are kept.
    pub fn init(&mut self, param: DriverParam) -> Result<(), DriverError> {
        self.release_resources()?;
        let decoder = create_decoder::<D>(&param)?;
        let input = create_input(&param.input_param)?;
        self.install(param, decoder, input);
        Ok(())
    }

    /// Like [`LidarDriver::init`], with a packet source supplied by the caller.
    /// `param.input_param` is ignored.
    pub fn init_with_input(
        &mut self,
        param: DriverParam,
        input: Box<dyn Input>,
    ) -> Result<(), DriverError> {
        self.release_resources()?;
        let decoder = create_decoder::<D>(&param)?;
        self.install(param, decoder, input);
        Ok(())
    }

    fn release_resources(&mut self) -> Result<(), DriverError> {
        if self.state == DriverState::Running {
            return Err(DriverError::AlreadyRunning);
        }
        self.input = None;
        self.pipeline = None;
        self.state = DriverState::Uninitialized;
        Ok(())
    }

    fn install(&mut self, param: DriverParam, decoder: D, input: Box<dyn Input>) {
        let header = FrameHeader {
            frame_id: param.frame_id.clone(),
            lidar_model: param.device_type.clone(),
        };
        let pipeline = Pipeline::new(decoder, self.callbacks.clone(), header, param.use_lidar_clock);
        info!("Initialized the driver: {}", param);
        self.pipeline = Some(Arc::new(pipeline));
        self.input = Some(input);
        self.param = param;
        self.state = DriverState::Initialized;
    }

    /// Spawns the ingestion thread. Starting a running driver does nothing.
    pub fn start(&mut self) -> Result<(), DriverError> {
        if self.state == DriverState::Running {
            return Ok(());
        }
        let (pipeline, input) = match (&self.pipeline, self.input.take()) {
            (Some(pipeline), Some(input)) => (pipeline.clone(), input),
            _ => return Err(DriverError::NotInitialized),
        };

        let timeout = self.param.receive_timeout();
        pipeline.set_running(true);
        let thread_pipeline = pipeline.clone();
        let spawned = thread::Builder::new()
            .name("rslidar-ingestion".to_string())
            .spawn(move || receive_packets(thread_pipeline, input, timeout));

        match spawned {
            Ok(handle) => {
                self.ingestion_thread = Some(handle);
                self.state = DriverState::Running;
                info!("Started the driver");
                Ok(())
            }
            Err(e) => {
                // The input went down with the closure.
                pipeline.set_running(false);
                self.pipeline = None;
                self.state = DriverState::Uninitialized;
                Err(e.into())
            }
        }
    }

    /// Stops ingestion and decoding.
    ///
    /// Packets not yet decoded and the frame in progress are discarded.
    /// Returns once no decode task can touch the frame accumulators anymore.
    /// Calling `stop` on a driver that is not running does nothing.
    pub fn stop(&mut self) {
        if self.state != DriverState::Running {
            return;
        }
        let pipeline = match &self.pipeline {
            Some(pipeline) => pipeline.clone(),
            None => return,
        };

        pipeline.set_running(false);
        if let Some(thread) = self.ingestion_thread.take() {
            match thread.join() {
                Ok(input) => self.input = Some(input),
                Err(_) => error!("The ingestion thread panicked"),
            }
        }
        pipeline.discard_pending();

        self.state = DriverState::Stopped;
        info!("Stopped the driver");
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == DriverState::Running
    }

    /// Feeds a DIFOP packet to the decoder outside the ingestion path.
    pub fn decode_difop_packet(&self, pkt: &LidarPacketMsg) -> Result<(), DriverError> {
        match &self.pipeline {
            Some(pipeline) => {
                pipeline.decode_difop(pkt);
                Ok(())
            }
            None => Err(DriverError::NotInitialized),
        }
    }

    /// Called with every point cloud that has at least one point.
    pub fn register_points_callback<F>(&self, callback: F)
    where
        F: Fn(&LidarPointsMsg<D::Point>) + Send + Sync + 'static,
    {
        self.callbacks.add_points(Box::new(callback));
    }

    /// Called with the raw packets of every frame.
    pub fn register_scan_callback<F>(&self, callback: F)
    where
        F: Fn(&LidarScanMsg) + Send + Sync + 'static,
    {
        self.callbacks.add_scan(Box::new(callback));
    }

    /// Called with every DIFOP packet, after the decoder has seen it.
    pub fn register_packet_callback<F>(&self, callback: F)
    where
        F: Fn(&LidarPacketMsg) + Send + Sync + 'static,
    {
        self.callbacks.add_packet(Box::new(callback));
    }

    /// Replaces the callback receiving input faults.
    pub fn register_exception_callback<F>(&self, callback: F)
    where
        F: Fn(ErrCode) + Send + Sync + 'static,
    {
        self.callbacks.set_exception(Box::new(callback));
    }
}

fn create_decoder<D: Decoder>(param: &DriverParam) -> Result<D, DriverError> {
    param.validate()?;
    let mut decoder = D::new(param.lidar_type()?, &param.decoder_param)?;
    if !param.calib_path.is_empty() {
        decoder.load_calibration(Path::new(&param.calib_path))?;
    }
    Ok(decoder)
}

impl<D: Decoder> Default for LidarDriver<D> {
    fn default() -> Self {
        LidarDriver::new()
    }
}

impl<D: Decoder> Drop for LidarDriver<D> {
    fn drop(&mut self) {
        self.stop();
    }
}
