//! Transcript export
//!
//! Pure, deterministic serialization of stored transcriptions to plain text.
//! Timestamped transcripts render one `[mm:ss] text` line per segment; the
//! bulk form concatenates a client's transcriptions under ruled headers.

use crate::database::models::{Segment, Transcription};

/// Render seconds as `mm:ss`, or `hh:mm:ss` from one hour up
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Render a segment sequence as one `[mm:ss] text` line per segment
pub fn export_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| format!("[{}] {}", format_timestamp(s.start_time), s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render one transcription as downloadable plain text
///
/// With segments present the timestamped form wins; the translation, when
/// there is one, follows the transcript under its own rule.
pub fn export_transcription(transcription: &Transcription, segments: &[Segment]) -> String {
    let mut out = String::new();

    if !segments.is_empty() {
        out.push_str(&export_segments(segments));
    } else {
        out.push_str(&transcription.raw_text);
    }

    if let Some(ref translated) = transcription.translated_text {
        out.push_str("\n\n");
        out.push_str(&"-".repeat(50));
        out.push('\n');
        match transcription.language {
            Some(ref lang) => out.push_str(&format!("Translation ({})\n", lang)),
            None => out.push_str("Translation\n"),
        }
        out.push_str(&"-".repeat(50));
        out.push_str("\n\n");
        out.push_str(translated);
    }

    out
}

/// Render a set of transcriptions as one document with ruled headers
pub fn export_transcriptions(entries: &[(Transcription, Vec<Segment>)]) -> String {
    let mut out = String::new();

    for (i, (transcription, segments)) in entries.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&"=".repeat(50));
        out.push('\n');
        out.push_str(&format!("File: {}\n", transcription.source_filename));
        out.push_str(&format!("Date: {}\n", transcription.created_at));
        if let Some(ref lang) = transcription.language {
            out.push_str(&format!("Language: {}\n", lang));
        }
        out.push_str(&"=".repeat(50));
        out.push_str("\n\n");
        out.push_str(&export_transcription(transcription, segments));
    }

    out
}
