/// 数字卫兵 (Digital Sentinel)
///
/// 过线计数与轨迹汇总
///
/// 系统架构:
/// 1. 相机线程: 读帧 → 跟踪 → 检测 → 关联 (独立工作线程)
/// 2. 输入线程: 标准输入控制命令
/// 3. 主线程:   事件输出 (JSON 行) 与缩略图保存
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crossbeam_channel::{select, unbounded};
use tracing::{info, warn};

use sentinel_rs::tracking::AssociationPolicy;
use sentinel_rs::{Camera, CameraEvent, ImageSequence, Orientation, TrackerConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 参考线每次移动的像素
const LINE_STEP: f32 = 10.0;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    /// 丢弃重叠检测, 其余新建
    Suppress,
    /// 最大重叠匹配
    Best,
}

/// 数字卫兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "数字卫兵 - 过线计数与轨迹汇总", long_about = None)]
struct Args {
    /// 图片序列目录
    source: PathBuf,

    /// 配置文件 (不存在时自动创建)
    #[arg(short, long, default_value = "sentinel_config.json")]
    config: PathBuf,

    /// 跟踪器: template / kalman (及别名)
    #[arg(short, long)]
    tracker: Option<String>,

    /// 检测关联策略
    #[arg(long, value_enum)]
    policy: Option<Policy>,

    /// 每处理一帧跳过的帧数
    #[arg(long)]
    skip: Option<u64>,

    /// 播放结束后退出 (不回绕)
    #[arg(long, default_value_t = false)]
    no_loop: bool,

    /// 启动即推送 JPEG 帧
    #[arg(long, default_value_t = false)]
    play: bool,

    /// 缩略图/播放帧保存目录
    #[arg(long)]
    output: Option<PathBuf>,
}

/// 标准输入控制命令
#[derive(Debug, Clone, Copy)]
enum Command {
    Line(Orientation, f32),
    TogglePause,
    TogglePlay,
    Forward,
    Backward,
    Clear,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "w" => Some(Command::Line(Orientation::Horizontal, -LINE_STEP)),
        "s" => Some(Command::Line(Orientation::Horizontal, LINE_STEP)),
        "a" => Some(Command::Line(Orientation::Vertical, -LINE_STEP)),
        "d" => Some(Command::Line(Orientation::Vertical, LINE_STEP)),
        "p" => Some(Command::TogglePause),
        "v" => Some(Command::TogglePlay),
        "f" => Some(Command::Forward),
        "r" => Some(Command::Backward),
        "c" => Some(Command::Clear),
        "q" => Some(Command::Quit),
        _ => None,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sentinel_rs=info,sentinel=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    info!("🚀 数字卫兵启动");

    let mut config = TrackerConfig::load(&args.config);
    if let Some(tracker) = &args.tracker {
        config.tracker = tracker.clone();
    }
    if let Some(policy) = args.policy {
        config.association_policy = match policy {
            Policy::Suppress => AssociationPolicy::SuppressThenSpawn,
            Policy::Best => AssociationPolicy::BestMatch,
        };
    }
    if let Some(skip) = args.skip {
        config.skip_count = skip;
    }
    if args.no_loop {
        config.loop_playback = false;
    }
    config.print_summary();

    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("无法创建输出目录 {}", dir.display()))?;
    }

    let source = ImageSequence::open(&args.source)?;
    let mut camera = Camera::from_config(config, Box::new(source))?;

    let (event_tx, event_rx) = unbounded();
    camera.subscribe(event_tx);
    if args.play {
        camera.play();
    }
    camera.start()?;

    // 标准输入控制线程 (输入关闭时线程结束)
    let (cmd_tx, cmd_rx) = unbounded();
    // 主线程保留一个发送端, 输入关闭后通道不会断开
    let stdin_tx = cmd_tx.clone();
    thread::Builder::new()
        .name(String::from("stdin"))
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(cmd) => {
                        if stdin_tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => warn!("⚠️  未知命令: {:?} (w/s/a/d/p/v/f/r/c/q)", line.trim()),
                }
            }
        })
        .context("无法创建输入线程")?;

    let stdout = io::stdout();
    loop {
        select! {
            recv(event_rx) -> event => {
                let Ok(event) = event else { break };
                match &event {
                    CameraEvent::Trail(trail) => {
                        let mut out = stdout.lock();
                        writeln!(out, "{}", serde_json::to_string(&event)?)?;
                        out.flush()?;
                        if let (Some(dir), Some(jpeg)) = (&args.output, &trail.thumbnail) {
                            let path = dir.join(format!("track_{}_{}.jpg", trail.id, trail.retired_at));
                            if let Err(e) = std::fs::write(&path, jpeg) {
                                warn!("❌ 保存缩略图 {} 失败: {}", path.display(), e);
                            }
                        }
                    }
                    CameraEvent::Frame { jpeg, .. } => {
                        if let Some(dir) = &args.output {
                            if let Err(e) = std::fs::write(dir.join("latest.jpg"), jpeg) {
                                warn!("❌ 保存播放帧失败: {}", e);
                            }
                        }
                    }
                    CameraEvent::Stop => {
                        writeln!(stdout.lock(), "{}", serde_json::to_string(&event)?)?;
                        break;
                    }
                }
            }
            recv(cmd_rx) -> cmd => {
                let Ok(cmd) = cmd else { continue };
                match cmd {
                    Command::Line(orientation, delta) => camera.set_reference_line(orientation, delta),
                    Command::TogglePause => {
                        if camera.is_paused() {
                            info!("▶️  继续");
                            camera.resume();
                        } else {
                            info!("⏸️  暂停");
                            camera.pause();
                        }
                    }
                    Command::TogglePlay => {
                        if camera.is_playing() {
                            camera.stop_play();
                        } else {
                            camera.play();
                        }
                    }
                    Command::Forward => camera.forward(),
                    Command::Backward => camera.backward(),
                    Command::Clear => camera.clear_all_contexts(),
                    Command::Quit => {
                        info!("👋 退出...");
                        camera.stop();
                    }
                }
            }
        }
    }

    drop(cmd_tx);
    camera.stop();
    let counts = camera.counts();
    info!(
        "📊 计数: 上 {} | 下 {} | 左 {} | 右 {} | 合计 {}",
        counts.up,
        counts.down,
        counts.left,
        counts.right,
        counts.total()
    );
    println!("{}", serde_json::json!({ "kind": "summary", "counts": counts }));
    Ok(())
}
