// SPDX-License-Identifier: MPL-2.0

//! Output sinks: a 32-bit BMP writer, a video-manifest exporter, and a
//! JSONL metrics logger (`spec.md` §4, C14).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::raw_image::RawImage;

/// Write `image` as a top-down-sourced, bottom-up-stored 32bpp BMP
/// (`BITMAPFILEHEADER` + `BITMAPINFOHEADER`, `BI_RGB`). Returns `Ok(())` on
/// success; any I/O failure is returned rather than panicking.
pub fn write_bmp(path: impl AsRef<Path>, image: &RawImage) -> io::Result<()> {
    let width = image.width();
    let height = image.height();
    let row_bytes = width as usize * 4;
    let pixel_data_len = row_bytes * height as usize;
    let file_header_len = 14u32;
    let info_header_len = 40u32;
    let pixel_data_offset = file_header_len + info_header_len;
    let file_size = pixel_data_offset + pixel_data_len as u32;

    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    // BITMAPFILEHEADER
    w.write_all(b"BM")?;
    w.write_all(&file_size.to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?; // reserved1
    w.write_all(&0u16.to_le_bytes())?; // reserved2
    w.write_all(&pixel_data_offset.to_le_bytes())?;

    // BITMAPINFOHEADER
    w.write_all(&info_header_len.to_le_bytes())?;
    w.write_all(&(width as i32).to_le_bytes())?;
    w.write_all(&(height as i32).to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?; // planes
    w.write_all(&32u16.to_le_bytes())?; // bit count
    w.write_all(&0u32.to_le_bytes())?; // BI_RGB
    w.write_all(&(pixel_data_len as u32).to_le_bytes())?;
    w.write_all(&2835i32.to_le_bytes())?; // ~72 DPI
    w.write_all(&2835i32.to_le_bytes())?;
    w.write_all(&0u32.to_le_bytes())?; // colors used
    w.write_all(&0u32.to_le_bytes())?; // important colors

    // Pixel data, bottom-up, from the top-down source.
    let bytes = image.bytes();
    for y in (0..height).rev() {
        let start = y as usize * row_bytes;
        w.write_all(&bytes[start..start + row_bytes])?;
    }

    w.flush()
}

/// Write a numbered sequence path in the `--record` CLI's `BASE_%06d.bmp`
/// convention.
#[must_use]
pub fn numbered_path(base: &Path, index: u64) -> std::path::PathBuf {
    let file_name = base
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("frame");
    let parent = base.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{file_name}_{index:06}.bmp"))
}

/// One entry in a video-manifest export: the written frame path and how
/// many real-time repeats it represents.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub path: std::path::PathBuf,
    pub repeats: u64,
}

/// Write an FFmpeg `concat` demuxer manifest. Honors the idiosyncrasy that
/// the final `file` line has no matching `duration` line and so must be
/// duplicated, or FFmpeg silently drops the last frame's duration.
pub fn write_concat_manifest(
    path: impl AsRef<Path>,
    entries: &[ManifestEntry],
    fps: f64,
) -> io::Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    for (i, entry) in entries.iter().enumerate() {
        let file_line = format!("file '{}'\n", entry.path.display());
        w.write_all(file_line.as_bytes())?;

        if i + 1 == entries.len() {
            // FFmpeg concat quirk: last "file" line must repeat with no duration.
            w.write_all(file_line.as_bytes())?;
        } else {
            let duration = entry.repeats as f64 / fps;
            w.write_all(format!("duration {duration}\n").as_bytes())?;
        }
    }

    w.flush()
}

fn frame_type() -> &'static str {
    "frame"
}

fn aggregate_type() -> &'static str {
    "aggregate"
}

/// Per-frame metrics record (`spec.md` §4 "Metrics sink").
#[derive(Debug, Clone, Serialize)]
pub struct FrameMetric {
    #[serde(rename = "type", skip_deserializing, default = "frame_type")]
    pub kind: &'static str,
    pub t: f64,
    pub frame_index: i64,
    pub tsec: f64,
    pub unique: u8,
    pub dup_skipped_total: u64,
    pub pool_frames: usize,
    pub rss_mb: f64,
    pub diff_ratio: f64,
    pub dedupe_block: u8,
}

impl FrameMetric {
    #[must_use]
    pub fn new(
        t: f64,
        frame_index: i64,
        tsec: f64,
        unique: u8,
        dup_skipped_total: u64,
        pool_frames: usize,
        rss_mb: f64,
        diff_ratio: f64,
        dedupe_block: u8,
    ) -> Self {
        Self {
            kind: frame_type(),
            t,
            frame_index,
            tsec,
            unique,
            dup_skipped_total,
            pool_frames,
            rss_mb,
            diff_ratio,
            dedupe_block,
        }
    }
}

/// Aggregate metrics record, emitted at >= 1s cadence.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateMetric {
    #[serde(rename = "type", skip_deserializing, default = "aggregate_type")]
    pub kind: &'static str,
    pub t: f64,
    pub captured_total: u64,
    pub unique_total: u64,
    pub duplicate_total: u64,
    pub pool_frames: usize,
    pub pool_bytes: u64,
}

impl AggregateMetric {
    #[must_use]
    pub fn new(
        t: f64,
        captured_total: u64,
        unique_total: u64,
        duplicate_total: u64,
        pool_frames: usize,
        pool_bytes: u64,
    ) -> Self {
        Self {
            kind: aggregate_type(),
            t,
            captured_total,
            unique_total,
            duplicate_total,
            pool_frames,
            pool_bytes,
        }
    }
}

/// Append-only JSONL writer for metrics records. Numbers are plain JSON
/// numbers; callers must not pass NaN/Infinity (serde_json rejects them).
pub struct MetricsSink {
    writer: BufWriter<File>,
}

impl MetricsSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }

    pub fn write_frame(&mut self, record: &FrameMetric) -> io::Result<()> {
        self.write_line(record)
    }

    pub fn write_aggregate(&mut self, record: &AggregateMetric) -> io::Result<()> {
        self.write_line(record)
    }

    fn write_line<T: Serialize>(&mut self, record: &T) -> io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn numbered_path_matches_base_pct06d_bmp_convention() {
        let base = PathBuf::from("out/frame");
        let path = numbered_path(&base, 3);
        assert_eq!(path, PathBuf::from("out/frame_000003.bmp"));
    }

    #[test]
    fn bmp_round_trips_header_and_pixel_count() {
        let dir = std::env::temp_dir().join(format!("fabric-core-bmp-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("frame.bmp");

        let image = RawImage::solid(2, 2, 10, 20, 30);
        write_bmp(&path, &image).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..2], b"BM");
        let pixel_offset = u32::from_le_bytes(bytes[10..14].try_into().unwrap());
        assert_eq!(pixel_offset, 54);
        let expected_len = 54 + 2 * 2 * 4;
        assert_eq!(bytes.len(), expected_len);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn concat_manifest_duplicates_final_file_line_without_duration() {
        let dir = std::env::temp_dir().join(format!("fabric-core-manifest-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("concat.txt");

        let entries = vec![
            ManifestEntry {
                path: PathBuf::from("a.bmp"),
                repeats: 3,
            },
            ManifestEntry {
                path: PathBuf::from("b.bmp"),
                repeats: 2,
            },
        ];
        write_concat_manifest(&path, &entries, 10.0).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "file 'a.bmp'");
        assert_eq!(lines[1], "duration 0.3");
        assert_eq!(lines[2], "file 'b.bmp'");
        assert_eq!(lines[3], "file 'b.bmp'");
        assert_eq!(lines.len(), 4);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn metrics_sink_emits_one_json_object_per_line() {
        let dir = std::env::temp_dir().join(format!("fabric-core-metrics-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("metrics.jsonl");

        let mut sink = MetricsSink::create(&path).unwrap();
        sink.write_frame(&FrameMetric::new(0.0, 0, 0.0, 1, 0, 1, 42.0, 0.0, 0))
            .unwrap();
        sink.write_aggregate(&AggregateMetric::new(1.0, 10, 3, 7, 3, 1024))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "frame");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["type"], "aggregate");

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }
}


