use std::mem;

use rslidar_data::{LidarPacketMsg, LidarPointsMsg, LidarScanMsg};

use crate::decoder::{DecodeStatus, Decoder};

/// Identifiers stamped onto every emitted message.
#[derive(Clone, Debug)]
pub(crate) struct FrameHeader {
    pub(crate) frame_id: String,
    pub(crate) lidar_model: String,
}

/// Accumulates decoded points and their raw packets until the decoder
/// reports a frame split.
pub(crate) struct FrameAssembler<P> {
    points: Vec<P>,
    packets: Vec<LidarPacketMsg>,
    scratch: Vec<P>,
    points_seq: u32,
    scan_seq: u32,
}

impl<P> FrameAssembler<P> {
    pub(crate) fn new() -> Self {
        FrameAssembler {
            points: Vec::new(),
            packets: Vec::new(),
            scratch: Vec::new(),
            points_seq: 0,
            scan_seq: 0,
        }
    }

    /// Appends `pkt` to the scan and its decoded points to the cloud.
    ///
    /// Points of a packet the decoder rejects are not kept.
    pub(crate) fn push_and_decode<D>(&mut self, pkt: LidarPacketMsg, decoder: &mut D) -> DecodeStatus
    where
        D: Decoder<Point = P>,
    {
        self.packets.push(pkt);
        let pkt = &self.packets[self.packets.len() - 1];
        self.scratch.clear();
        let status = decoder.decode_msop(pkt.packet(), &mut self.scratch);
        if status != DecodeStatus::Error {
            self.points.append(&mut self.scratch);
        }
        status
    }

    #[cfg(test)]
    pub(crate) fn point_count(&self) -> usize {
        self.points.len()
    }

    pub(crate) fn last_packet(&self) -> Option<&LidarPacketMsg> {
        self.packets.last()
    }

    /// Moves the accumulated points into a message.
    ///
    /// Returns `None` for a frame without points; the point accumulator is
    /// still emptied but no sequence number is consumed.
    pub(crate) fn take_points(
        &mut self,
        timestamp: f64,
        header: &FrameHeader,
        height: u32,
    ) -> Option<LidarPointsMsg<P>> {
        if self.points.is_empty() {
            return None;
        }
        let capacity = self.points.len();
        let points = mem::replace(&mut self.points, Vec::with_capacity(capacity));
        self.points_seq = self.points_seq.wrapping_add(1);
        let height = height.max(1);
        Some(LidarPointsMsg {
            timestamp,
            seq: self.points_seq,
            parent_frame_id: header.frame_id.clone(),
            frame_id: header.frame_id.clone(),
            lidar_model: header.lidar_model.clone(),
            height,
            width: points.len() as u32 / height,
            is_dense: false,
            is_transform: false,
            is_motion_correct: false,
            points,
        })
    }

    /// Moves the accumulated packets into a message.
    pub(crate) fn take_scan(&mut self, timestamp: f64, header: &FrameHeader) -> LidarScanMsg {
        let capacity = self.packets.len();
        let packets = mem::replace(&mut self.packets, Vec::with_capacity(capacity));
        self.scan_seq = self.scan_seq.wrapping_add(1);
        LidarScanMsg {
            timestamp,
            seq: self.scan_seq,
            parent_frame_id: header.frame_id.clone(),
            frame_id: header.frame_id.clone(),
            packets,
        }
    }

    /// Drops the frame in progress.
    pub(crate) fn reset(&mut self) {
        self.points.clear();
        self.packets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderParam;
    use crate::error::DriverError;
    use rslidar_data::{LidarType, RSLIDAR_PKT_LEN};
    use std::path::Path;

    /// Packet byte 0 holds the number of points, byte 1 the status.
    struct ByteDecoder;

    impl Decoder for ByteDecoder {
        type Point = u8;

        fn new(_: LidarType, _: &DecoderParam) -> Result<Self, DriverError> {
            Ok(ByteDecoder)
        }

        fn load_calibration(&mut self, _: &Path) -> Result<(), DriverError> {
            Ok(())
        }

        fn decode_msop(&mut self, pkt: &[u8], points: &mut Vec<u8>) -> DecodeStatus {
            points.extend(std::iter::repeat(pkt[0]).take(pkt[0].into()));
            match pkt[1] {
                0 => DecodeStatus::Ok,
                1 => DecodeStatus::FrameSplit,
                _ => DecodeStatus::Error,
            }
        }

        fn decode_difop(&mut self, _: &[u8]) {}

        fn lidar_time(&self, _: &[u8]) -> f64 {
            0.
        }
    }

    fn packet(n_points: u8, status: u8) -> LidarPacketMsg {
        let mut raw = [0u8; RSLIDAR_PKT_LEN];
        raw[0] = n_points;
        raw[1] = status;
        LidarPacketMsg::new(&raw, 0.)
    }

    fn header() -> FrameHeader {
        FrameHeader {
            frame_id: "rslidar".to_string(),
            lidar_model: "RS16".to_string(),
        }
    }

    #[test]
    fn test_rejected_packet_keeps_no_points() {
        let mut assembler = FrameAssembler::new();
        let mut decoder = ByteDecoder;
        assert_eq!(
            assembler.push_and_decode(packet(3, 0), &mut decoder),
            DecodeStatus::Ok
        );
        assert_eq!(
            assembler.push_and_decode(packet(5, 2), &mut decoder),
            DecodeStatus::Error
        );
        assert_eq!(assembler.point_count(), 3);
        // The rejected packet is still part of the raw scan.
        let scan = assembler.take_scan(1., &header());
        assert_eq!(scan.packets.len(), 2);
    }

    #[test]
    fn test_take_points_stamps_message() {
        let mut assembler = FrameAssembler::new();
        let mut decoder = ByteDecoder;
        assembler.push_and_decode(packet(16, 0), &mut decoder);
        assembler.push_and_decode(packet(16, 1), &mut decoder);

        let msg = assembler.take_points(3.5, &header(), 16).unwrap();
        assert_eq!(msg.seq, 1);
        assert_eq!(msg.timestamp, 3.5);
        assert_eq!(msg.points.len(), 32);
        assert_eq!(msg.height, 16);
        assert_eq!(msg.width, 2);
        assert_eq!(msg.frame_id, "rslidar");
        assert_eq!(msg.parent_frame_id, "rslidar");
        assert_eq!(msg.lidar_model, "RS16");
        assert!(!msg.is_dense && !msg.is_transform && !msg.is_motion_correct);
        assert_eq!(assembler.point_count(), 0);

        let scan = assembler.take_scan(3.5, &header());
        assert_eq!(scan.seq, 1);
        assert_eq!(scan.packets.len(), 2);
        assert!(assembler.last_packet().is_none());
    }

    #[test]
    fn test_empty_frame_consumes_no_sequence_number() {
        let mut assembler = FrameAssembler::new();
        let mut decoder = ByteDecoder;
        assembler.push_and_decode(packet(0, 1), &mut decoder);
        assert!(assembler.take_points(0., &header(), 1).is_none());
        assert_eq!(assembler.take_scan(0., &header()).seq, 1);

        assembler.push_and_decode(packet(4, 1), &mut decoder);
        assert_eq!(assembler.take_points(0., &header(), 1).unwrap().seq, 1);
        assert_eq!(assembler.take_scan(0., &header()).seq, 2);
    }

    #[test]
    fn test_reset_keeps_sequences() {
        let mut assembler = FrameAssembler::new();
        let mut decoder = ByteDecoder;
        assembler.push_and_decode(packet(2, 1), &mut decoder);
        assembler.take_points(0., &header(), 1).unwrap();
        assembler.take_scan(0., &header());

        assembler.push_and_decode(packet(2, 0), &mut decoder);
        assembler.reset();
        assert_eq!(assembler.point_count(), 0);
        assert!(assembler.last_packet().is_none());

        assembler.push_and_decode(packet(2, 1), &mut decoder);
        assert_eq!(assembler.take_points(0., &header(), 1).unwrap().seq, 2);
        assert_eq!(assembler.take_scan(0., &header()).seq, 2);
    }
}
