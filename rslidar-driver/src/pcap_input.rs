use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{Block, LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};
use rslidar_data::RSLIDAR_PKT_LEN;

use crate::config::InputParam;
use crate::error::DriverError;
use crate::input::{Input, InputState};

const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

/// One MSOP or DIFOP payload taken from the capture.
#[derive(Clone)]
struct CapturedPacket {
    state: InputState,
    /// Capture time in microseconds.
    time_us: u64,
    payload: Vec<u8>,
}

/// Replays the MSOP and DIFOP packets of a pcap or pcapng capture.
///
/// The whole capture is loaded up front. Packets are classified by UDP
/// destination port and paced by their capture timestamps, with each gap
/// capped at the receive timeout.
pub struct PcapInput {
    packets: Vec<CapturedPacket>,
    index: usize,
    repeat: bool,
}

impl PcapInput {
    pub fn from_file<P: AsRef<Path>>(path: P, param: &InputParam) -> Result<PcapInput, DriverError> {
        let data = std::fs::read(path.as_ref())?;
        let input = PcapInput::from_bytes(&data, param)?;
        debug!(
            "Loaded {} packets from {}",
            input.len(),
            path.as_ref().display()
        );
        Ok(input)
    }

    pub fn from_bytes(data: &[u8], param: &InputParam) -> Result<PcapInput, DriverError> {
        let mut packets = Vec::new();
        if data.len() >= 4 && data[0..4] == PCAPNG_MAGIC {
            extract_pcapng(data, param, &mut packets)?;
        } else {
            extract_legacy_pcap(data, param, &mut packets)?;
        }
        Ok(PcapInput {
            packets,
            index: 0,
            repeat: param.pcap_repeat,
        })
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Gap to the previous packet, capped at `limit`.
    fn pacing(&self, limit: Duration) -> Duration {
        if self.index == 0 {
            return Duration::ZERO;
        }
        let gap = self.packets[self.index]
            .time_us
            .saturating_sub(self.packets[self.index - 1].time_us);
        Duration::from_micros(gap).min(limit)
    }
}

fn extract_legacy_pcap(
    data: &[u8],
    param: &InputParam,
    packets: &mut Vec<CapturedPacket>,
) -> Result<(), DriverError> {
    // The buffer must hold the whole capture or the reader reports Incomplete.
    let mut reader = LegacyPcapReader::new(data.len().max(65536), data)
        .map_err(|e| DriverError::Pcap(format!("{:?}", e)))?;
    let mut nanosecond = false;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        nanosecond = header.is_nanosecond_precision();
                    }
                    PcapBlockOwned::Legacy(record) => {
                        let sub = if nanosecond {
                            u64::from(record.ts_usec) / 1000
                        } else {
                            u64::from(record.ts_usec)
                        };
                        let time_us = u64::from(record.ts_sec) * 1_000_000 + sub;
                        if let Some(packet) = classify(record.data, time_us, param) {
                            packets.push(packet);
                        }
                    }
                    _ => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                warn!("The pcap file ends with a truncated record");
                break;
            }
            Err(e) => return Err(DriverError::Pcap(format!("{:?}", e))),
        }
    }
    Ok(())
}

fn extract_pcapng(
    data: &[u8],
    param: &InputParam,
    packets: &mut Vec<CapturedPacket>,
) -> Result<(), DriverError> {
    let mut reader = PcapNGReader::new(data.len().max(65536), data)
        .map_err(|e| DriverError::Pcap(format!("{:?}", e)))?;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                        // Default interface resolution is microseconds.
                        let time_us = (u64::from(epb.ts_high) << 32) | u64::from(epb.ts_low);
                        if let Some(packet) = classify(epb.data, time_us, param) {
                            packets.push(packet);
                        }
                    }
                    PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                        let time_us = packets.last().map_or(0, |p| p.time_us);
                        if let Some(packet) = classify(spb.data, time_us, param) {
                            packets.push(packet);
                        }
                    }
                    _ => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                warn!("The pcapng file ends with a truncated block");
                break;
            }
            Err(e) => return Err(DriverError::Pcap(format!("{:?}", e))),
        }
    }
    Ok(())
}

/// Extracts the UDP payload of an Ethernet frame and tags it by port.
fn classify(frame: &[u8], time_us: u64, param: &InputParam) -> Option<CapturedPacket> {
    use etherparse::{SlicedPacket, TransportSlice};

    let sliced = SlicedPacket::from_ethernet(frame).ok()?;
    let udp = match sliced.transport {
        Some(TransportSlice::Udp(udp)) => udp,
        _ => return None,
    };

    let state = match udp.destination_port() {
        port if port == param.msop_port => InputState::Msop,
        port if port == param.difop_port => InputState::Difop,
        _ => return None,
    };

    let payload = udp.payload();
    if payload.len() != RSLIDAR_PKT_LEN {
        warn!(
            "Skipped a {} byte payload on port {}",
            payload.len(),
            udp.destination_port()
        );
        return None;
    }

    Some(CapturedPacket {
        state,
        time_us,
        payload: payload.to_vec(),
    })
}

impl Input for PcapInput {
    fn get_packet(&mut self, pkt: &mut [u8; RSLIDAR_PKT_LEN], timeout: Duration) -> InputState {
        if self.index >= self.packets.len() {
            if self.repeat && !self.packets.is_empty() {
                debug!("Replaying the pcap file from the start");
                self.index = 0;
            } else {
                thread::sleep(timeout);
                return InputState::Exit;
            }
        }

        let pause = self.pacing(timeout);
        if !pause.is_zero() {
            thread::sleep(pause);
        }

        let packet = &self.packets[self.index];
        pkt.copy_from_slice(&packet.payload);
        self.index += 1;
        packet.state
    }
}
