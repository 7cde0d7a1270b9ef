use std::path::Path;
use std::process::Command;

use vshorts_media::{check_ffmpeg, check_ffprobe, check_ytdlp, StrategyRegistry};
use vshorts_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();
    config.validate()?;

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tool("ffmpeg", check_ffmpeg().ok().as_deref())?;
    ensure_tool("ffprobe", check_ffprobe().ok().as_deref())?;
    ensure_tool("yt-dlp", check_ytdlp().ok().as_deref())?;

    let registry = StrategyRegistry::global();
    println!(
        "worker-selfcheck: {} download strategies: {}",
        registry.len(),
        registry.names().join(", ")
    );

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_tool(name: &str, path: Option<&Path>) -> anyhow::Result<()> {
    let path = path.ok_or_else(|| anyhow::anyhow!("{} not found on PATH", name))?;
    let flag = if name == "yt-dlp" { "--version" } else { "-version" };
    let output = Command::new(path)
        .arg(flag)
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("{} {} failed: {:?}", name, flag, output.status));
    }
    let version = String::from_utf8_lossy(&output.stdout);
    println!(
        "worker-selfcheck: {} {}",
        name,
        version.lines().next().unwrap_or_default()
    );
    Ok(())
}
