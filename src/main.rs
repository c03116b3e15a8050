// src/main.rs

mod aggregation;
mod classification;
mod config;
mod error;
mod inference;
mod pipeline;
mod preprocessing;
mod types;
mod video_source;

use anyhow::Result;
use inference::ClassifierHandle;
use pipeline::{AnalysisPipeline, CancelToken, LogSink};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use types::{AnalysisResult, Config};
use walkdir::WalkDir;

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "emergency_detection={},ort=warn",
            config.logging.level
        ))
        .init();

    info!("🚨 Emergency Video Analysis Starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Decision thresholds: per_unit={:.2}, confidence={:.2}, ratio={:.2}",
        config.decision.per_unit_threshold,
        config.decision.confidence_threshold,
        config.decision.ratio_threshold
    );

    let mut handle = ClassifierHandle::load(&config.model)?;
    info!("✓ Classifier ready");

    let video_files = find_video_files(&config.video.input_dir);
    if video_files.is_empty() {
        error!("No video files found in {}", config.video.input_dir);
        return Ok(());
    }
    info!("Found {} video file(s) to analyze", video_files.len());

    std::fs::create_dir_all(&config.video.output_dir)?;
    let results_path = Path::new(&config.video.output_dir).join("analysis_results.jsonl");
    let mut results_file = std::fs::File::create(&results_path)?;
    info!("💾 Results will be written to: {}", results_path.display());

    let cancel = CancelToken::new();
    let mut analysis = AnalysisPipeline::new(config.clone());

    for (idx, video_path) in video_files.iter().enumerate() {
        info!("========================================");
        info!(
            "Analyzing video {}/{}: {}",
            idx + 1,
            video_files.len(),
            video_path.display()
        );

        match analysis.run(video_path, &mut handle, &mut LogSink, &cancel) {
            Ok(result) => {
                report_result(&result);
                if let Err(e) = save_result(video_path, &result, &mut results_file) {
                    warn!("Failed to save result: {}", e);
                }
            }
            Err(e) => error!("Failed to analyze {}: {}", video_path.display(), e),
        }
    }

    handle.unload();
    Ok(())
}

fn find_video_files(input_dir: &str) -> Vec<PathBuf> {
    let video_extensions = ["mp4", "avi", "mov", "mkv", "MP4", "AVI", "MOV", "MKV"];

    let mut videos = Vec::new();
    for entry in WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if video_extensions.contains(&ext.to_str().unwrap_or("")) {
                videos.push(path.to_path_buf());
            }
        }
    }

    info!("Found {} video files", videos.len());
    videos
}

fn report_result(result: &AnalysisResult) {
    info!("📊 Analysis Report:");
    info!("  Total units: {}", result.total_units);
    info!(
        "  Emergency units: {} ({:.1}%)",
        result.emergency_units,
        if result.total_units > 0 {
            100.0 * result.emergency_units as f64 / result.total_units as f64
        } else {
            0.0
        }
    );
    info!("  Dominant class: {}", result.dominant_class);
    info!("  Confidence: {:.1}%", result.confidence * 100.0);
    for prediction in &result.top_predictions {
        info!(
            "    {} ({:.1}%){}",
            prediction.label,
            prediction.probability * 100.0,
            if prediction.is_emergency { " ⚠️" } else { "" }
        );
    }
    if result.is_emergency {
        warn!("  🚨 Verdict: EMERGENCY");
    } else {
        info!("  ✅ Verdict: normal");
    }
}

fn save_result(
    video_path: &Path,
    result: &AnalysisResult,
    file: &mut std::fs::File,
) -> Result<()> {
    use std::io::Write;

    let json_value = serde_json::json!({
        "video": video_path.display().to_string(),
        "result": result,
    });
    writeln!(file, "{}", serde_json::to_string(&json_value)?)?;
    file.flush()?;
    Ok(())
}
