use clap::{Arg, ArgAction, Command};
use rslidar_data::{LidarScanMsg, LidarType, PointXYZI};
use rslidar_driver::{
    DecodeStatus, Decoder, DecoderParam, DriverError, DriverParam, LidarDriver, SplitFrameMode,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Splits frames by packet count and produces no points.
struct PacketCounter {
    pkts_per_frame: u32,
    n_pkts: u32,
}

impl Decoder for PacketCounter {
    type Point = PointXYZI;

    fn new(lidar_type: LidarType, param: &DecoderParam) -> Result<Self, DriverError> {
        let pkts_per_frame = match (param.mode_split_frame, lidar_type) {
            (SplitFrameMode::FixedPackets, _) => param.num_pkts_split,
            (_, LidarType::RS16) => 84,
            (_, LidarType::RS32) | (_, LidarType::RSBP) => 168,
            (_, LidarType::RS128) => 1200,
        };
        Ok(PacketCounter {
            pkts_per_frame,
            n_pkts: 0,
        })
    }

    fn load_calibration(&mut self, _path: &Path) -> Result<(), DriverError> {
        Ok(())
    }

    fn decode_msop(&mut self, _pkt: &[u8], _points: &mut Vec<PointXYZI>) -> DecodeStatus {
        self.n_pkts += 1;
        if self.n_pkts >= self.pkts_per_frame {
            self.n_pkts = 0;
            DecodeStatus::FrameSplit
        } else {
            DecodeStatus::Ok
        }
    }

    fn decode_difop(&mut self, _pkt: &[u8]) {}

    fn lidar_time(&self, _pkt: &[u8]) -> f64 {
        0.
    }
}

fn get_param() -> (DriverParam, u64) {
    let matches = Command::new("RoboSense packet reader.")
        .about("Receives packets from a RoboSense LiDAR or a capture file.")
        .disable_version_flag(true)
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML file with the driver parameters"),
        )
        .arg(
            Arg::new("pcap")
                .long("pcap")
                .help("Replays a pcap file instead of listening on the network"),
        )
        .arg(
            Arg::new("repeat")
                .long("repeat")
                .action(ArgAction::SetTrue)
                .help("Replays the pcap file in a loop"),
        )
        .arg(
            Arg::new("seconds")
                .long("seconds")
                .value_parser(clap::value_parser!(u64))
                .default_value("10")
                .help("How long to run"),
        )
        .get_matches();

    let mut param = match matches.get_one::<String>("config") {
        Some(path) => DriverParam::from_file(path).unwrap_or_else(|e| {
            eprintln!("{e}");
            std::process::exit(1);
        }),
        None => DriverParam::default(),
    };
    if let Some(pcap) = matches.get_one::<String>("pcap") {
        param.input_param.read_pcap = true;
        param.input_param.pcap_file_dir = pcap.to_string();
    }
    if matches.get_flag("repeat") {
        param.input_param.pcap_repeat = true;
    }
    let seconds: u64 = *matches.get_one("seconds").unwrap();
    (param, seconds)
}

fn main() {
    env_logger::init();
    let (param, seconds) = get_param();
    println!("{}", serde_json::to_string_pretty(&param).unwrap());

    let mut driver = LidarDriver::<PacketCounter>::new();
    let n_difop = Arc::new(AtomicUsize::new(0));
    {
        let n_difop = n_difop.clone();
        driver.register_packet_callback(move |_| {
            n_difop.fetch_add(1, Ordering::Relaxed);
        });
    }
    driver.register_scan_callback(|scan: &LidarScanMsg| {
        println!(
            "scan {:>6}  {:>5} packets  t = {:.6}",
            scan.seq,
            scan.packets.len(),
            scan.timestamp
        );
    });
    driver.register_exception_callback(|code| {
        if !code.is_timeout() {
            eprintln!("{code}");
        }
    });

    if let Err(e) = driver.init(param) {
        eprintln!("Failed to initialize the driver. Error: {}", e);
        std::process::exit(1);
    }
    driver.start().unwrap();
    std::thread::sleep(Duration::from_secs(seconds));
    driver.stop();

    println!("{} DIFOP packets", n_difop.load(Ordering::Relaxed));
}
