use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{trace, warn};
use rslidar_data::RSLIDAR_PKT_LEN;

use crate::config::InputParam;
use crate::constants::{INPUT_CHANNEL_CAPACITY, SOCKET_BUFFER_SIZE, SOCKET_READ_TIMEOUT_MS};
use crate::error::DriverError;
use crate::input::{Input, InputState};

type Received = (InputState, Vec<u8>);

/// Live packet source: one UDP socket and reader thread per port.
pub struct UdpInput {
    packet_rx: Receiver<Received>,
    terminator_txs: Vec<Sender<bool>>,
    reader_threads: Vec<JoinHandle<()>>,
    msop_addr: SocketAddr,
    difop_addr: SocketAddr,
}

impl UdpInput {
    /// Binds the MSOP and DIFOP ports on all interfaces.
    pub fn bind(param: &InputParam) -> Result<UdpInput, DriverError> {
        let device_ip: IpAddr = param.device_ip.parse().map_err(|_| {
            DriverError::Config(format!("\"{}\" is not an IP address", param.device_ip))
        })?;
        let msop = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, param.msop_port))?;
        let difop = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, param.difop_port))?;
        UdpInput::from_sockets(msop, difop, device_ip)
    }

    /// Uses already bound sockets. Datagrams whose sender is not `device_ip`
    /// are dropped unless `device_ip` is unspecified.
    pub fn from_sockets(
        msop: UdpSocket,
        difop: UdpSocket,
        device_ip: IpAddr,
    ) -> Result<UdpInput, DriverError> {
        let timeout = Some(Duration::from_millis(SOCKET_READ_TIMEOUT_MS));
        msop.set_read_timeout(timeout)?;
        difop.set_read_timeout(timeout)?;
        let msop_addr = msop.local_addr()?;
        let difop_addr = difop.local_addr()?;

        let (packet_tx, packet_rx) = bounded(INPUT_CHANNEL_CAPACITY);
        let mut terminator_txs = Vec::new();
        let mut reader_threads = Vec::new();
        for (socket, state) in [(msop, InputState::Msop), (difop, InputState::Difop)] {
            let (terminator_tx, terminator_rx) = bounded(10);
            let packet_tx = packet_tx.clone();
            reader_threads.push(thread::spawn(move || {
                read_socket(socket, state, device_ip, packet_tx, terminator_rx);
            }));
            terminator_txs.push(terminator_tx);
        }

        Ok(UdpInput {
            packet_rx,
            terminator_txs,
            reader_threads,
            msop_addr,
            difop_addr,
        })
    }

    pub fn msop_addr(&self) -> SocketAddr {
        self.msop_addr
    }

    pub fn difop_addr(&self) -> SocketAddr {
        self.difop_addr
    }
}

fn read_socket(
    socket: UdpSocket,
    state: InputState,
    device_ip: IpAddr,
    packet_tx: Sender<Received>,
    terminator_rx: Receiver<bool>,
) {
    let mut buf = vec![0u8; SOCKET_BUFFER_SIZE];
    loop {
        if do_terminate(&terminator_rx) {
            return;
        }

        match socket.recv_from(&mut buf) {
            Ok((n, sender)) => {
                if n != RSLIDAR_PKT_LEN {
                    warn!("Dropped a {} byte datagram from {}", n, sender);
                    continue;
                }
                if !device_ip.is_unspecified() && sender.ip() != device_ip {
                    trace!("Ignored a packet from {}", sender);
                    continue;
                }
                match packet_tx.try_send((state, buf[..n].to_vec())) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => trace!("Input channel full, dropped a packet"),
                    Err(TrySendError::Disconnected(_)) => return,
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                warn!("Failed to receive on {:?}: {}", socket.local_addr(), e);
                let _ = packet_tx.try_send((InputState::Error, Vec::new()));
                thread::sleep(Duration::from_millis(SOCKET_READ_TIMEOUT_MS));
            }
        }
    }
}

fn do_terminate(terminator_rx: &Receiver<bool>) -> bool {
    terminator_rx.try_recv().unwrap_or(false)
}

impl Input for UdpInput {
    fn get_packet(&mut self, pkt: &mut [u8; RSLIDAR_PKT_LEN], timeout: Duration) -> InputState {
        match self.packet_rx.recv_timeout(timeout) {
            Ok((state @ (InputState::Msop | InputState::Difop), data)) => {
                pkt.copy_from_slice(&data);
                state
            }
            Ok((state, _)) => state,
            Err(RecvTimeoutError::Timeout) => InputState::Timeout,
            Err(RecvTimeoutError::Disconnected) => InputState::Error,
        }
    }
}

impl Drop for UdpInput {
    fn drop(&mut self) {
        for terminator_tx in &self.terminator_txs {
            let _ = terminator_tx.send(true);
        }
        for thread in self.reader_threads.drain(..) {
            if thread.join().is_err() {
                warn!("A socket reader thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_input(device_ip: &str) -> UdpInput {
        let msop = UdpSocket::bind("127.0.0.1:0").unwrap();
        let difop = UdpSocket::bind("127.0.0.1:0").unwrap();
        UdpInput::from_sockets(msop, difop, device_ip.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_classifies_by_port() {
        let mut input = loopback_input("127.0.0.1");
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        let mut msop = [0u8; RSLIDAR_PKT_LEN];
        msop[0] = 0x55;
        sender.send_to(&msop, input.msop_addr()).unwrap();
        let mut buf = [0u8; RSLIDAR_PKT_LEN];
        assert_eq!(
            input.get_packet(&mut buf, Duration::from_secs(2)),
            InputState::Msop
        );
        assert_eq!(buf[0], 0x55);

        let mut difop = [0u8; RSLIDAR_PKT_LEN];
        difop[0] = 0xA5;
        sender.send_to(&difop, input.difop_addr()).unwrap();
        assert_eq!(
            input.get_packet(&mut buf, Duration::from_secs(2)),
            InputState::Difop
        );
        assert_eq!(buf[0], 0xA5);
    }

    #[test]
    fn test_drops_wrong_sized_datagrams() {
        let mut input = loopback_input("0.0.0.0");
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[0u8; 100], input.msop_addr()).unwrap();

        let mut buf = [0u8; RSLIDAR_PKT_LEN];
        assert_eq!(
            input.get_packet(&mut buf, Duration::from_millis(300)),
            InputState::Timeout
        );
    }

    #[test]
    fn test_filters_by_device_ip() {
        let mut input = loopback_input("10.0.0.1");
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(&[0u8; RSLIDAR_PKT_LEN], input.msop_addr())
            .unwrap();

        let mut buf = [0u8; RSLIDAR_PKT_LEN];
        assert_eq!(
            input.get_packet(&mut buf, Duration::from_millis(300)),
            InputState::Timeout
        );
    }

    #[test]
    fn test_invalid_device_ip() {
        let param = InputParam {
            device_ip: "lidar.local".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            UdpInput::bind(&param),
            Err(DriverError::Config(_))
        ));
    }
}
