//! SRT cue generation for burned-in captions.

/// Format seconds as an SRT timestamp (`HH:MM:SS,mmm`).
pub fn format_srt_timestamp(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// A subtitle file with one cue spanning the whole segment.
pub fn single_cue_srt(text: &str, duration: f64) -> String {
    // Blank lines would terminate the cue early
    let body: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    format!(
        "1\n{} --> {}\n{}\n\n",
        format_srt_timestamp(0.0),
        format_srt_timestamp(duration),
        body.join("\n")
    )
}
