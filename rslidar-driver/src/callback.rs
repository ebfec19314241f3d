use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use log::error;
use rslidar_data::{ErrCode, LidarPacketMsg, LidarPointsMsg, LidarScanMsg};

pub type PointsCallback<P> = Box<dyn Fn(&LidarPointsMsg<P>) + Send + Sync>;
pub type ScanCallback = Box<dyn Fn(&LidarScanMsg) + Send + Sync>;
pub type PacketCallback = Box<dyn Fn(&LidarPacketMsg) + Send + Sync>;
pub type ExceptionCallback = Box<dyn Fn(ErrCode) + Send + Sync>;

/// Copy-on-write list; dispatch iterates a snapshot taken outside the lock.
type Subscribers<F> = RwLock<Arc<Vec<Arc<F>>>>;

/// Subscribers of the driver's messages.
///
/// Lists only grow. Subscribers run synchronously, in registration order, on
/// the thread that produced the event. A subscriber that panics is logged and
/// skipped so the others still receive the event; a subscriber that blocks
/// stalls the ones after it. No lock is held while a subscriber runs, so a
/// subscriber may register others; they receive events from the next one on.
pub(crate) struct CallbackRegistry<P> {
    points: Subscribers<dyn Fn(&LidarPointsMsg<P>) + Send + Sync>,
    scan: Subscribers<dyn Fn(&LidarScanMsg) + Send + Sync>,
    packet: Subscribers<dyn Fn(&LidarPacketMsg) + Send + Sync>,
    exception: RwLock<Option<Arc<dyn Fn(ErrCode) + Send + Sync>>>,
}

impl<P> CallbackRegistry<P> {
    pub(crate) fn new() -> Self {
        CallbackRegistry {
            points: RwLock::new(Arc::new(Vec::new())),
            scan: RwLock::new(Arc::new(Vec::new())),
            packet: RwLock::new(Arc::new(Vec::new())),
            exception: RwLock::new(None),
        }
    }

    pub(crate) fn add_points(&self, callback: PointsCallback<P>) {
        push(&self.points, Arc::from(callback));
    }

    pub(crate) fn add_scan(&self, callback: ScanCallback) {
        push(&self.scan, Arc::from(callback));
    }

    pub(crate) fn add_packet(&self, callback: PacketCallback) {
        push(&self.packet, Arc::from(callback));
    }

    /// Replaces the previous exception callback, if any.
    pub(crate) fn set_exception(&self, callback: ExceptionCallback) {
        *self.exception.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::from(callback));
    }

    pub(crate) fn run_points(&self, msg: &LidarPointsMsg<P>) {
        for callback in snapshot(&self.points).iter() {
            guarded("points", || callback(msg));
        }
    }

    pub(crate) fn run_scan(&self, msg: &LidarScanMsg) {
        for callback in snapshot(&self.scan).iter() {
            guarded("scan", || callback(msg));
        }
    }

    pub(crate) fn run_packet(&self, msg: &LidarPacketMsg) {
        for callback in snapshot(&self.packet).iter() {
            guarded("packet", || callback(msg));
        }
    }

    pub(crate) fn report_error(&self, code: ErrCode) {
        let exception = self
            .exception
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = exception {
            guarded("exception", || callback(code));
        }
    }
}

fn snapshot<F: ?Sized>(list: &Subscribers<F>) -> Arc<Vec<Arc<F>>> {
    list.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn push<F: ?Sized>(list: &Subscribers<F>, callback: Arc<F>) {
    let mut list = list.write().unwrap_or_else(PoisonError::into_inner);
    Arc::make_mut(&mut list).push(callback);
}

fn guarded<F: FnOnce()>(kind: &str, f: F) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!("A {} callback panicked", kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use rslidar_data::RSLIDAR_PKT_LEN;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_runs_in_registration_order() {
        let registry = CallbackRegistry::<u8>::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            registry.add_points(Box::new(move |_: &LidarPointsMsg<u8>| {
                order.lock().unwrap().push(i)
            }));
        }
        registry.run_points(&LidarPointsMsg::default());
        registry.run_points(&LidarPointsMsg::default());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let registry = CallbackRegistry::<u8>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        registry.add_scan(Box::new(|_: &LidarScanMsg| panic!("subscriber failure")));
        {
            let seen = seen.clone();
            registry.add_scan(Box::new(move |msg: &LidarScanMsg| {
                seen.lock().unwrap().push(msg.seq)
            }));
        }
        let msg = LidarScanMsg {
            seq: 7,
            ..Default::default()
        };
        registry.run_scan(&msg);
        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_last_exception_callback_wins() {
        let registry = CallbackRegistry::<u8>::new();
        let codes = Arc::new(Mutex::new(Vec::new()));
        {
            let codes = codes.clone();
            registry.set_exception(Box::new(move |_: ErrCode| codes.lock().unwrap().push("first")));
        }
        {
            let codes = codes.clone();
            registry.set_exception(Box::new(move |_: ErrCode| codes.lock().unwrap().push("second")));
        }
        registry.report_error(ErrCode::MsopTimeout);
        assert_eq!(*codes.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn test_missing_exception_callback_is_silent() {
        let registry = CallbackRegistry::<u8>::new();
        registry.report_error(ErrCode::InputError);
        registry.run_packet(&LidarPacketMsg::new(&[0; RSLIDAR_PKT_LEN], 0.));
    }

    #[test]
    fn test_subscriber_can_register_subscribers() {
        let registry = Arc::new(CallbackRegistry::<u8>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let inner_registry = registry.clone();
            let seen = seen.clone();
            registry.add_scan(Box::new(move |_: &LidarScanMsg| {
                let seen = seen.clone();
                inner_registry.add_scan(Box::new(move |msg: &LidarScanMsg| {
                    seen.lock().unwrap().push(msg.seq)
                }));
            }));
        }

        let (done_tx, done_rx) = bounded(1);
        {
            let registry = registry.clone();
            thread::spawn(move || {
                let first = LidarScanMsg {
                    seq: 1,
                    ..Default::default()
                };
                registry.run_scan(&first);
                let second = LidarScanMsg {
                    seq: 2,
                    ..Default::default()
                };
                registry.run_scan(&second);
                let _ = done_tx.send(());
            });
        }
        assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok());
        // Subscribers added during an event only see the following events.
        assert_eq!(*seen.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_exception_callback_can_replace_itself() {
        let registry = Arc::new(CallbackRegistry::<u8>::new());
        let codes = Arc::new(Mutex::new(Vec::new()));
        {
            let inner_registry = registry.clone();
            let codes = codes.clone();
            registry.set_exception(Box::new(move |_: ErrCode| {
                let codes = codes.clone();
                inner_registry.set_exception(Box::new(move |code: ErrCode| {
                    codes.lock().unwrap().push(code)
                }));
            }));
        }

        let (done_tx, done_rx) = bounded(1);
        {
            let registry = registry.clone();
            thread::spawn(move || {
                registry.report_error(ErrCode::MsopTimeout);
                registry.report_error(ErrCode::PcapExit);
                let _ = done_tx.send(());
            });
        }
        assert!(done_rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert_eq!(*codes.lock().unwrap(), vec![ErrCode::PcapExit]);
    }
}
