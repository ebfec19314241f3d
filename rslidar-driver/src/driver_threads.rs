use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_utils::CachePadded;
use log::{debug, error};
use rslidar_data::{ErrCode, LidarPacketMsg, LidarPointsMsg, LidarScanMsg, RSLIDAR_PKT_LEN};

use crate::callback::CallbackRegistry;
use crate::decoder::{DecodeStatus, Decoder};
use crate::frame::{FrameAssembler, FrameHeader};
use crate::input::{Input, InputState};
use crate::queue::PacketQueue;
use crate::thread_pool::ThreadPool;
use crate::time::get_time;

type Frame<P> = (Option<LidarPointsMsg<P>>, LidarScanMsg);

/// State shared by the ingestion thread and the decode tasks.
pub(crate) struct Pipeline<D: Decoder> {
    running: CachePadded<AtomicBool>,
    msop_queue: PacketQueue<LidarPacketMsg>,
    difop_queue: PacketQueue<LidarPacketMsg>,
    decoder: Mutex<D>,
    assembler: Mutex<FrameAssembler<D::Point>>,
    callbacks: Arc<CallbackRegistry<D::Point>>,
    header: FrameHeader,
    use_lidar_clock: bool,
}

impl<D: Decoder> Pipeline<D> {
    pub(crate) fn new(
        decoder: D,
        callbacks: Arc<CallbackRegistry<D::Point>>,
        header: FrameHeader,
        use_lidar_clock: bool,
    ) -> Self {
        Pipeline {
            running: CachePadded::new(AtomicBool::new(false)),
            msop_queue: PacketQueue::new(),
            difop_queue: PacketQueue::new(),
            decoder: Mutex::new(decoder),
            assembler: Mutex::new(FrameAssembler::new()),
            callbacks,
            header,
            use_lidar_clock,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn decode_difop(&self, pkt: &LidarPacketMsg) {
        lock(&self.decoder).decode_difop(pkt.packet());
    }

    /// Drops queued packets and the frame in progress.
    ///
    /// Must only be called once the ingestion thread has been joined.
    pub(crate) fn discard_pending(&self) {
        let n_msop = self.msop_queue.clear();
        let n_difop = self.difop_queue.clear();
        lock(&self.assembler).reset();
        if n_msop + n_difop > 0 {
            debug!(
                "Discarded {} MSOP and {} DIFOP packets on stop",
                n_msop, n_difop
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn msop_backlog(&self) -> usize {
        self.msop_queue.len()
    }

    #[cfg(test)]
    pub(crate) fn max_msop_consumers(&self) -> usize {
        self.msop_queue.max_consumers()
    }

    fn process_msop(&self) {
        self.consume(&self.msop_queue, || self.drain_msop());
    }

    fn process_difop(&self) {
        self.consume(&self.difop_queue, || self.drain_difop());
    }

    /// Runs `drain` while holding the claim on `queue`.
    ///
    /// After releasing, the queue is checked again: a packet pushed between
    /// the last pop and the release found the claim taken, so nobody else
    /// was scheduled for it. The claim is also released if `drain` unwinds.
    fn consume<F: Fn()>(&self, queue: &PacketQueue<LidarPacketMsg>, drain: F) {
        loop {
            {
                let _claim = Claim(queue);
                #[cfg(test)]
                let _active = queue.track_consumer();
                drain();
            }
            if !self.is_running() || queue.is_empty() || !queue.try_claim() {
                return;
            }
        }
    }

    fn drain_msop(&self) {
        loop {
            // Running is checked and the packet popped under the assembler
            // lock, which `discard_pending` also takes.
            let frame = {
                let mut assembler = lock(&self.assembler);
                if !self.is_running() {
                    return;
                }
                let pkt = match self.msop_queue.pop() {
                    Some(pkt) => pkt,
                    None => return,
                };
                let mut decoder = lock(&self.decoder);
                let decoded = panic::catch_unwind(AssertUnwindSafe(|| {
                    assembler.push_and_decode(pkt, &mut *decoder)
                }));
                match decoded {
                    Ok(DecodeStatus::FrameSplit) => {
                        Some(self.split_frame(&mut assembler, &decoder))
                    }
                    Ok(DecodeStatus::Ok | DecodeStatus::Error) => None,
                    Err(_) => {
                        error!("The decoder panicked on an MSOP packet, dropping the frame in progress");
                        assembler.reset();
                        None
                    }
                }
            };

            if let Some((points, scan)) = frame {
                if let Some(points) = points {
                    self.callbacks.run_points(&points);
                }
                self.callbacks.run_scan(&scan);
            }
        }
    }

    fn split_frame(&self, assembler: &mut FrameAssembler<D::Point>, decoder: &D) -> Frame<D::Point> {
        let timestamp = match assembler.last_packet() {
            Some(pkt) if self.use_lidar_clock => decoder.lidar_time(pkt.packet()),
            _ => get_time(),
        };

        let points = assembler.take_points(timestamp, &self.header, decoder.height());
        if points.is_none() {
            debug!("Dropped a frame without points");
        }
        let scan = assembler.take_scan(timestamp, &self.header);
        (points, scan)
    }

    fn drain_difop(&self) {
        while self.is_running() {
            let pkt = match self.difop_queue.pop() {
                Some(pkt) => pkt,
                None => return,
            };
            self.decode_difop(&pkt);
            self.callbacks.run_packet(&pkt);
        }
    }
}

/// Releases the claim on a queue when dropped.
struct Claim<'a, T>(&'a PacketQueue<T>);

impl<T> Drop for Claim<'_, T> {
    fn drop(&mut self) {
        self.0.release();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Body of the ingestion thread.
///
/// Runs until the pipeline stops and hands the input back so a later start
/// can reuse it.
pub(crate) fn receive_packets<D: Decoder>(
    pipeline: Arc<Pipeline<D>>,
    mut input: Box<dyn Input>,
    timeout: Duration,
) -> Box<dyn Input> {
    let mut buf = [0u8; RSLIDAR_PKT_LEN];
    while pipeline.is_running() {
        match input.get_packet(&mut buf, timeout) {
            InputState::Msop => {
                pipeline.msop_queue.push(LidarPacketMsg::new(&buf, get_time()));
                if pipeline.msop_queue.try_claim() {
                    let pipeline = pipeline.clone();
                    ThreadPool::instance().commit(move || pipeline.process_msop());
                }
            }
            InputState::Difop => {
                pipeline.difop_queue.push(LidarPacketMsg::new(&buf, get_time()));
                if pipeline.difop_queue.try_claim() {
                    let pipeline = pipeline.clone();
                    ThreadPool::instance().commit(move || pipeline.process_difop());
                }
            }
            InputState::Timeout => pipeline.callbacks.report_error(ErrCode::MsopTimeout),
            InputState::Error => pipeline.callbacks.report_error(ErrCode::InputError),
            InputState::Exit => pipeline.callbacks.report_error(ErrCode::PcapExit),
        }
    }
    input
}
