mod calibration;
mod capture;
mod config;
mod display;
mod events;
mod geom;
mod mode;
mod overlay;
mod recorder;
mod session;
mod targets;
mod transmit;

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

use calibration::{CalibrationEngine, ImageOrientation};
use capture::{FrameSource, Source};
use config::Config;
use display::DisplayWindow;
use geom::PixelPoint;
use recorder::Recorder;
use session::{Disposition, Session};
use transmit::{PacketLayout, UdpTransmitter};

const WINDOW_TITLE: &str = "Live Ultrasound Video Capture";

/// Parse a video source: a bare integer is a device index, anything else a
/// file path.
fn parse_source(s: &str) -> Result<Source, String> {
    if s.is_empty() {
        return Err("source must not be empty".to_string());
    }
    match s.parse::<u32>() {
        Ok(index) => Ok(Source::Device(index)),
        Err(_) => Ok(Source::File(PathBuf::from(s))),
    }
}

/// Parse and validate a packet layout descriptor.
fn parse_layout(s: &str) -> Result<String, String> {
    PacketLayout::parse(s).map_err(|e| e.to_string())?;
    Ok(s.to_string())
}

/// sono-capture: interactive ultrasound capture with target transmission
#[derive(Parser)]
#[command(name = "sono-capture")]
#[command(version, about = "Live ultrasound video capture with calibration and UDP targeting")]
#[command(long_about = "Capture live ultrasound video (or replay a recording), calibrate \
    pixel-to-millimeter scale from two clicks 10 mm apart, select targets on the image, \
    and transmit their physical coordinates to a peer over UDP.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive capture session
    #[command(after_help = "KEYS (while running):
    r      Start/stop recording
    c      Toggle calibration mode
    t      Toggle targeting mode
    h      Hide/show annotations (normal mode only)
    q      Quit

MOUSE (calibration mode):
    left          Select a calibration point (mark 10 mm of depth with two clicks)
    right         Place the frame origin
    middle        Lazy origin: frame center line, clicked depth (or ctrl+left)

MOUSE (targeting mode):
    left          Select a target
    right         Remove the nearest selected target
    middle        Send the nearest selected target to the peer (or ctrl+left)")]
    Run {
        /// Custom config file path (default: ~/.config/sono-capture/config.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Video source: device index or video file path
        #[arg(long, short = 's', value_parser = parse_source)]
        source: Option<Source>,

        /// Frame width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Frame height in pixels
        #[arg(long)]
        height: Option<u32>,

        /// Directory recordings are written to
        #[arg(long)]
        record_dir: Option<PathBuf>,

        /// Recording frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Local address the UDP socket binds to
        #[arg(long)]
        local: Option<SocketAddr>,

        /// Peer address targets are sent to
        #[arg(long)]
        peer: Option<SocketAddr>,

        /// Packet layout descriptor (e.g. 2d, >2d, <2f)
        #[arg(long, value_parser = parse_layout)]
        layout: Option<String>,
    },

    /// Listen for transmitted targets and print them (debug receiver)
    #[command(after_help = "EXAMPLES:
    sono-capture listen
    sono-capture listen --addr 0.0.0.0:60522 --layout \">2d\"")]
    Listen {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:60522")]
        addr: SocketAddr,

        /// Packet layout descriptor
        #[arg(long, default_value = "2d", value_parser = parse_layout)]
        layout: String,
    },
}

/// Global flag set by the Ctrl+C handler.
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}

fn init_logger() {
    let config = ConfigBuilder::new().set_time_format_rfc2822().build();
    if let Err(e) =
        TermLogger::init(LevelFilter::Info, config, TerminalMode::Mixed, ColorChoice::Auto)
    {
        eprintln!("Failed to initialize logger: {}", e);
    }
}

/// Merged settings for a capture run: CLI args > config file > defaults.
struct RunSettings {
    source: Source,
    width: u32,
    height: u32,
    record_dir: PathBuf,
    fps: u32,
    local: SocketAddr,
    peer: SocketAddr,
    layout: PacketLayout,
    origin: PixelPoint,
    orientation: ImageOrientation,
}

#[allow(clippy::too_many_arguments)] // Direct mapping from CLI args
fn merge_settings(
    cfg: Config,
    source: Option<Source>,
    width: Option<u32>,
    height: Option<u32>,
    record_dir: Option<PathBuf>,
    fps: Option<u32>,
    local: Option<SocketAddr>,
    peer: Option<SocketAddr>,
    layout: Option<String>,
) -> Result<RunSettings, Box<dyn std::error::Error>> {
    let width = width.unwrap_or(cfg.capture.width);
    let height = height.unwrap_or(cfg.capture.height);
    if width == 0 || height == 0 {
        return Err("frame width and height must be greater than 0".into());
    }

    let layout = PacketLayout::parse(&layout.unwrap_or(cfg.network.layout))?;

    // Origin defaults to the frame center when the config leaves it unset
    let origin = cfg
        .calibration
        .origin
        .map(|[x, y]| PixelPoint::new(x, y))
        .unwrap_or_else(|| PixelPoint::new(width as i32 / 2, height as i32 / 2));

    Ok(RunSettings {
        source: source.unwrap_or(cfg.capture.source),
        width,
        height,
        record_dir: record_dir.unwrap_or(cfg.recording.directory),
        fps: fps.unwrap_or(cfg.recording.fps),
        local: local.unwrap_or(cfg.network.local_addr),
        peer: peer.unwrap_or(cfg.network.peer_addr),
        layout,
        origin,
        orientation: cfg.calibration.orientation,
    })
}

fn log_startup(settings: &RunSettings) {
    info!("=================================================");
    info!("Starting live ultrasound video capture");
    info!("Source: {} ({}x{})", settings.source, settings.width, settings.height);
    info!("Targets are sent to {} from {}", settings.peer, settings.local);
    info!("Press 'r' to start/stop recording, 'c' to toggle calibration mode, 't' to toggle targeting mode");
    info!("Press 'h' to hide/show annotations (not available in calibration and targeting modes)");
    info!("Press 'q' to quit");
    info!("Recordings will be saved in the '{}' folder", settings.record_dir.display());
    info!("=================================================");
}

fn run_capture(settings: RunSettings) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = setup_ctrlc_handler() {
        warn!("Could not set up Ctrl+C handler: {}", e);
    }

    let transmitter = UdpTransmitter::bind(settings.local, settings.peer, settings.layout)?;
    let recorder = Recorder::new(
        settings.record_dir.clone(),
        settings.fps,
        settings.width,
        settings.height,
    );
    let engine = CalibrationEngine::new(settings.origin, settings.orientation);

    let mut source = FrameSource::open(&settings.source, settings.width, settings.height)?;
    let mut display = DisplayWindow::open(WINDOW_TITLE, settings.width, settings.height)?;
    let mut session = Session::new(engine, recorder, Box::new(transmitter), settings.width);

    log_startup(&settings);

    // One iteration per frame: acquire, record, compose, present, dispatch.
    let outcome: Result<(), Box<dyn std::error::Error>> = loop {
        if ctrlc_received() {
            break Ok(());
        }
        if !display.is_open() {
            info!("Display window closed.");
            break Ok(());
        }

        let frame = match source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("End of video source.");
                break Ok(());
            }
            Err(e) => break Err(e.into()),
        };

        session.on_frame(&frame);

        let annotations = session.annotations(display.cursor());
        if let Err(e) = display.present(&frame, &annotations) {
            break Err(e.into());
        }

        let mut quit = false;
        for event in display.poll_events() {
            if session.handle_event(event, &frame) == Disposition::Quit {
                quit = true;
            }
        }
        if quit {
            break Ok(());
        }
    };

    // Ordered release: recording first, then capture; the display window
    // and socket close on drop. Each step runs even if an earlier one
    // reported a failure.
    session.shutdown();
    source.shutdown();
    drop(display);

    outcome
}

fn run_listen(addr: SocketAddr, layout: &str) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = setup_ctrlc_handler() {
        warn!("Could not set up Ctrl+C handler: {}", e);
    }

    let layout = PacketLayout::parse(layout)?;
    let socket = UdpSocket::bind(addr)?;
    // Short read timeout keeps the Ctrl+C check responsive
    socket.set_read_timeout(Some(Duration::from_secs(1)))?;
    info!("Listening for targets on {}... (Ctrl+C to stop)", addr);

    let mut buf = [0u8; 64];
    while !ctrlc_received() {
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => match layout.decode(&buf[..n]) {
                Ok(mm) => {
                    info!("Received target from {}: (x = {:.3} mm, y = {:.3} mm)", from, mm.x, mm.y)
                }
                Err(e) => warn!("Ignoring {}-byte datagram from {}: {}", n, from, e),
            },
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                continue
            }
            Err(e) => return Err(e.into()),
        }
    }
    info!("Receiver shut down.");
    Ok(())
}

fn main() {
    init_logger();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            source,
            width,
            height,
            record_dir,
            fps,
            local,
            peer,
            layout,
        } => Config::load(config.as_deref())
            .map_err(Into::into)
            .and_then(|cfg| {
                merge_settings(cfg, source, width, height, record_dir, fps, local, peer, layout)
            })
            .and_then(run_capture),
        Commands::Listen { addr, layout } => run_listen(addr, &layout),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_device_index() {
        assert!(matches!(parse_source("0").unwrap(), Source::Device(0)));
        assert!(matches!(parse_source("3").unwrap(), Source::Device(3)));
    }

    #[test]
    fn test_parse_source_file_path() {
        match parse_source("recordings/demo.mp4").unwrap() {
            Source::File(path) => assert_eq!(path, PathBuf::from("recordings/demo.mp4")),
            other => panic!("expected file source, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_source_rejects_empty() {
        assert!(parse_source("").is_err());
    }

    #[test]
    fn test_parse_layout_validates() {
        assert_eq!(parse_layout("2d").unwrap(), "2d");
        assert_eq!(parse_layout(">2f").unwrap(), ">2f");
        assert!(parse_layout("nope").is_err());
    }

    #[test]
    fn test_merge_prefers_cli_over_config() {
        let settings = merge_settings(
            Config::default(),
            Some(Source::Device(5)),
            Some(640),
            Some(480),
            Some(PathBuf::from("out")),
            Some(25),
            Some("127.0.0.1:1111".parse().unwrap()),
            Some("127.0.0.1:2222".parse().unwrap()),
            Some(">2d".to_string()),
        )
        .unwrap();
        assert!(matches!(settings.source, Source::Device(5)));
        assert_eq!(settings.width, 640);
        assert_eq!(settings.fps, 25);
        assert_eq!(settings.peer, "127.0.0.1:2222".parse().unwrap());
        assert_eq!(settings.layout, PacketLayout::parse(">2d").unwrap());
    }

    #[test]
    fn test_merge_falls_back_to_config_defaults() {
        let settings = merge_settings(
            Config::default(),
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        assert_eq!(settings.width, 1024);
        assert_eq!(settings.height, 768);
        assert_eq!(settings.fps, 60);
        assert_eq!(settings.local, "127.0.0.1:60511".parse().unwrap());
        assert_eq!(settings.peer, "127.0.0.1:60522".parse().unwrap());
        assert_eq!(settings.layout, PacketLayout::default());
    }

    #[test]
    fn test_merge_defaults_origin_to_frame_center() {
        let settings =
            merge_settings(Config::default(), None, None, None, None, None, None, None, None)
                .unwrap();
        assert_eq!(settings.origin, PixelPoint::new(512, 384));
    }

    #[test]
    fn test_merge_respects_configured_origin() {
        let mut cfg = Config::default();
        cfg.calibration.origin = Some([100, 200]);
        let settings =
            merge_settings(cfg, None, None, None, None, None, None, None, None).unwrap();
        assert_eq!(settings.origin, PixelPoint::new(100, 200));
    }

    #[test]
    fn test_merge_rejects_zero_dimensions() {
        let result = merge_settings(
            Config::default(),
            None,
            Some(0),
            None,
            None,
            None,
            None,
            None,
            None,
        );
        assert!(result.is_err());
    }
}
