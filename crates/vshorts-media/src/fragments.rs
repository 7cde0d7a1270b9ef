//! Fragment cutting of a composed video.

use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use vshorts_models::{CutList, Fragment};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{file_size, remove_if_exists};

/// Build the stream-copy command for one cut.
fn cut_command(processed: &Path, start_secs: f64, duration_secs: f64, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(processed, output)
        .seek(start_secs)
        .duration(duration_secs)
        .stream_copy()
        .output_args(["-avoid_negative_ts", "make_zero"])
}

/// Cut `processed` into the fragments listed in `cuts`, one after another.
///
/// Fragments are written to `out_dir` as `fragment_NNN.mp4`. If any cut
/// fails, the fragments already written are removed and the error returned.
pub async fn cut_fragments(
    processed: &Path,
    cuts: &CutList,
    out_dir: &Path,
    runner: &FfmpegRunner,
) -> MediaResult<Vec<Fragment>> {
    if !processed.exists() {
        return Err(MediaError::FileNotFound(processed.to_path_buf()));
    }
    fs::create_dir_all(out_dir).await?;

    info!(
        source = %processed.display(),
        count = cuts.len(),
        "Cutting fragments"
    );

    let mut fragments: Vec<Fragment> = Vec::with_capacity(cuts.len());
    for cut in cuts {
        let path = out_dir.join(cut.file_name());
        let cmd = cut_command(processed, cut.start_secs, cut.duration_secs, &path);

        if let Err(e) = runner.run(&cmd).await {
            remove_if_exists(&path).await;
            for fragment in &fragments {
                remove_if_exists(&fragment.path).await;
            }
            return Err(e);
        }

        let size_bytes = file_size(&path).await;
        debug!(
            number = cut.number,
            start_secs = cut.start_secs,
            duration_secs = cut.duration_secs,
            size_bytes,
            "Fragment written"
        );
        fragments.push(Fragment {
            number: cut.number,
            start_secs: cut.start_secs,
            duration_secs: cut.duration_secs,
            path,
            size_bytes,
        });
    }

    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vshorts_models::FragmentSpec;

    #[test]
    fn test_cut_command_uses_stream_copy() {
        let args = cut_command(
            Path::new("processed.mp4"),
            30.0,
            25.5,
            Path::new("fragment_002.mp4"),
        )
        .build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-ss 30.000 -t 25.500 -i processed.mp4"));
        assert!(joined.contains("-c copy -avoid_negative_ts make_zero fragment_002.mp4"));
    }

    #[tokio::test]
    async fn test_missing_processed_file() {
        let dir = TempDir::new().unwrap();
        let cuts = FragmentSpec::new(30).cut_list(90.0);
        let err = cut_fragments(
            &dir.path().join("missing.mp4"),
            &cuts,
            dir.path(),
            &FfmpegRunner::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_cut_list_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let processed = dir.path().join("processed.mp4");
        fs::write(&processed, b"x").await.unwrap();

        let fragments = cut_fragments(
            &processed,
            &CutList::default(),
            &dir.path().join("out"),
            &FfmpegRunner::new(),
        )
        .await
        .unwrap();
        assert!(fragments.is_empty());
    }
}
