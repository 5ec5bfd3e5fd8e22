//! vastream - capture raw video, encode H.264 on the VA-API accelerator,
//! stream over RTP.
//!
//! Usage:
//!   vastream [options]
//!
//! Options:
//!   -h, --help                 Print this message
//!   -V, --version              Display version
//!   -v, --verbose              Log debugging messages
//!   -b, --bitrate <bps>        Encoding bitrate
//!   -d, --device <path>        Video device name [/dev/video0]
//!   -o, --output <file>        Record raw NALs to an output file
//!   -i, --ipaddress <a.b.c.d>  Remote RTP address
//!   -p, --ipport <port>        Remote RTP port (0 = no RTP output)
//!       --dscp <class>         DSCP class for RTP datagrams
//!       --packet-size <bytes>  Alternate RTP payload size
//!   -f, --framerate <fps>      Capture frame rate
//!   -W, --dev-width <pixels>   Device width [720]
//!   -H, --dev-height <pixels>  Device height [480]
//!   -M, --mode <number>        0=v4l 1=ipcvideo 2=fixedframe 3=fixedframe4k
//!       --intra_period <n>     Frames between intra pictures
//!       --idr_period <n>       Frames between IDR resets
//!       --ip_period <n>        P-picture spacing (B frames between)
//!       --rcmode <mode>        NONE|CBR|VBR|VCM|CQP|VBR_CONSTRAINED
//!       --entropy <0|1>        1 = CABAC, 0 = CAVLC
//!       --profile <name>       BP|CBP|MP|HP
//!       --initial_qp <n>       Initial quantization parameter
//!       --minimal_qp <n>       Minimum quantization parameter
//!       --payloadmode <0|1>    0 = RTP/TS, 1 = RTP/ES
//!       --vpuport <port>       Enable the VPU UDP framer on this port
//!       --vpube                Emit the VPU framer header big-endian
//!       --sync                 Synchronous coded-data retrieval

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use vastream::capture::{open_source, CaptureMode};
use vastream::config::{PayloadMode, StreamConfig};
use vastream::sinks::build_sinks;
use vastream_codec::{EntropyMode, VaapiEncoder, VideoEncoder};

fn usage() {
    let defaults = StreamConfig::default();
    println!(
        "Usage: vastream [options]\n\
         \n\
         Options:\n\
         -h, --help                 Print this message\n\
         -V, --version              Display version\n\
         -v, --verbose              Log debugging messages\n\
         -b, --bitrate <bps>        Encoding bitrate\n\
         -d, --device <path>        Video device name [/dev/video0]\n\
         -o, --output <file>        Record raw NALs to an output file\n\
         -i, --ipaddress <a.b.c.d>  Remote RTP address\n\
         -p, --ipport <port>        Remote RTP port (0 = no RTP output)\n\
             --dscp <class>         DSCP class for RTP datagrams\n\
             --packet-size <bytes>  Alternate RTP payload size\n\
         -f, --framerate <fps>      Capture frame rate\n\
         -W, --dev-width <pixels>   Device width [720]\n\
         -H, --dev-height <pixels>  Device height [480]\n\
         -M, --mode <number>        0=v4l 1=ipcvideo 2=fixedframe 3=fixedframe4k\n\
             --intra_period <n>     Frames between intra pictures\n\
             --idr_period <n>       Frames between IDR resets\n\
             --ip_period <n>        P-picture spacing (B frames between)\n\
             --rcmode <mode>        NONE|CBR|VBR|VCM|CQP|VBR_CONSTRAINED\n\
             --entropy <0|1>        1 = CABAC, 0 = CAVLC\n\
             --profile <name>       BP|CBP|MP|HP\n\
             --initial_qp <n>       Initial quantization parameter\n\
             --minimal_qp <n>       Minimum quantization parameter\n\
             --payloadmode <0|1>    0 = RTP/TS, 1 = RTP/ES\n\
             --vpuport <port>       Enable the VPU UDP framer on this port\n\
             --vpube                Emit the VPU framer header big-endian\n\
             --sync                 Synchronous coded-data retrieval\n"
    );
    println!(
        "Defaults: {}x{} @{}fps, {} bps, rc {}, profile {}, GOP {}/{}/{}",
        defaults.encoder.width,
        defaults.encoder.height,
        defaults.encoder.frame_rate,
        defaults.encoder.bitrate,
        defaults.encoder.rate_control,
        defaults.encoder.profile,
        defaults.encoder.intra_period,
        defaults.encoder.intra_idr_period,
        defaults.encoder.ip_period,
    );
}

struct Options {
    config: StreamConfig,
    verbose: bool,
}

fn parse_args() -> Result<Options> {
    let mut config = StreamConfig::default();
    let mut verbose = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| -> Result<String> {
            args.next()
                .with_context(|| format!("{name} requires a value"))
        };
        match arg.as_str() {
            "-h" | "--help" => {
                usage();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                eprintln!("vastream {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "-v" | "--verbose" => verbose = true,
            "-b" | "--bitrate" => config.encoder.bitrate = value("--bitrate")?.parse()?,
            "-d" | "--device" => config.device = value("--device")?,
            "-o" | "--output" => config.nal_output = Some(value("--output")?.into()),
            "-i" | "--ipaddress" => config.ip_address = value("--ipaddress")?,
            "-p" | "--ipport" => config.ip_port = value("--ipport")?.parse()?,
            "--dscp" => config.dscp = value("--dscp")?.parse()?,
            "--packet-size" => config.packet_size = value("--packet-size")?.parse()?,
            "-f" | "--framerate" => config.encoder.frame_rate = value("--framerate")?.parse()?,
            "-W" | "--dev-width" => config.encoder.width = value("--dev-width")?.parse()?,
            "-H" | "--dev-height" => config.encoder.height = value("--dev-height")?.parse()?,
            "-M" | "--mode" => {
                config.mode = CaptureMode::from_flag(value("--mode")?.parse()?)?;
            }
            "--intra_period" => config.encoder.intra_period = value("--intra_period")?.parse()?,
            "--idr_period" => config.encoder.intra_idr_period = value("--idr_period")?.parse()?,
            "--ip_period" => config.encoder.ip_period = value("--ip_period")?.parse()?,
            "--rcmode" => config.encoder.rate_control = value("--rcmode")?.parse()?,
            "--entropy" => {
                config.encoder.entropy = if value("--entropy")?.parse::<u32>()? != 0 {
                    EntropyMode::Cabac
                } else {
                    EntropyMode::Cavlc
                };
            }
            "--profile" => config.encoder.profile = value("--profile")?.parse()?,
            "--initial_qp" => config.encoder.initial_qp = value("--initial_qp")?.parse()?,
            "--minimal_qp" => config.encoder.minimal_qp = value("--minimal_qp")?.parse()?,
            "--payloadmode" => {
                config.payload = PayloadMode::from_flag(value("--payloadmode")?.parse()?);
            }
            "--vpuport" => config.vpu_udp_port = value("--vpuport")?.parse()?,
            "--vpube" => config.vpu_udp_big_endian = true,
            "--sync" => config.encoder.synchronous = true,
            other => {
                usage();
                bail!("unknown option {other}");
            }
        }
    }
    Ok(Options { config, verbose })
}

fn main() -> Result<()> {
    let Options { config, verbose } = parse_args()?;

    tracing_subscriber::fmt()
        .with_max_level(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    // Reject bad settings before any hardware resource is touched.
    config
        .encoder
        .validate()
        .context("invalid encoder configuration")?;

    let mut source = open_source(&config).context("capture source failed to open")?;
    let format = source.format();
    info!(
        source = source.name(),
        width = format.width,
        height = format.height,
        fps = format.frame_rate,
        payload = ?config.payload,
        "capture negotiated"
    );

    // The capture source's geometry is authoritative for the encoder.
    let mut encoder_config = config.encoder.clone();
    encoder_config.width = format.width;
    encoder_config.height = format.height;
    encoder_config.frame_rate = format.frame_rate;
    encoder_config.source_format = format.pixel_format;

    let sinks = build_sinks(&config, format.frame_rate)?;
    let mut encoder =
        VaapiEncoder::new(encoder_config, sinks).context("encoder bring-up failed")?;

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = Arc::clone(&quit);
        ctrlc::set_handler(move || quit.store(true, Ordering::SeqCst))
            .context("installing signal handler")?;
    }

    info!("streaming; Ctrl-C to stop");
    while !quit.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "capture error, stopping");
                break;
            }
        };
        if !encoder.submit_frame(&frame)? {
            break;
        }
    }

    info!(
        frames = encoder.frames_submitted(),
        "shutting down, draining in-flight frames"
    );
    encoder.flush()?;
    Ok(())
}
