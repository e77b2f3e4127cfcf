use std::fmt::Write;

use picker_core::{OverrideRequest, ReleaseCandidate};

const RESPONSE_INSTRUCTION: &str = "Select the best release. Respond with JSON only: \
{\"choice\": <number>, \"reason\": \"<brief reason>\"}";

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Render a byte count with binary units and two decimals.
///
/// Formatting never depends on locale, so the same input always yields
/// the same bytes.
///
/// # Examples
///
/// ```
/// use picker_engine::prompt::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1536), "1.50 KB");
/// assert_eq!(format_size(4_294_967_296), "4.00 GB");
/// ```
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", SIZE_UNITS[unit])
}

fn format_age(minutes: f64) -> String {
    let minutes = minutes.max(0.0);
    if minutes < 60.0 {
        format!("{}m", minutes as u64)
    } else if minutes < 1440.0 {
        format!("{}h", (minutes / 60.0) as u64)
    } else {
        format!("{}d", (minutes / 1440.0) as u64)
    }
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

fn or_placeholder<'a>(s: &'a str, placeholder: &'a str) -> &'a str {
    if s.trim().is_empty() {
        placeholder
    } else {
        s
    }
}

/// Render candidates as a numbered table for the LLM.
///
/// One block per candidate, in input order, headed by its 1-based index.
/// That index is what the model answers with, so the list is never
/// reordered.
///
/// # Examples
///
/// ```
/// use picker_core::ReleaseCandidate;
/// use picker_engine::prompt::format_candidates;
///
/// let candidates = vec![
///     ReleaseCandidate { guid: "a".into(), title: "First".into(), ..Default::default() },
///     ReleaseCandidate { guid: "b".into(), title: "Second".into(), ..Default::default() },
/// ];
/// let table = format_candidates(&candidates);
/// assert!(table.starts_with("1. First\n"));
/// assert!(table.contains("\n2. Second\n"));
/// ```
pub fn format_candidates(candidates: &[ReleaseCandidate]) -> String {
    let mut out = String::new();
    for (i, c) in candidates.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let seeders = c
            .seeders
            .map_or_else(|| "n/a".to_string(), |s| s.to_string());
        let languages = if c.languages.is_empty() {
            "Unknown".to_string()
        } else {
            c.languages.join(", ")
        };
        let custom_formats = if c.custom_formats.is_empty() {
            "None".to_string()
        } else {
            c.custom_formats.join(", ")
        };

        let _ = writeln!(out, "{}. {}", i + 1, single_line(or_placeholder(&c.title, "Unknown")));
        let _ = writeln!(out, "   GUID: {}", single_line(&c.guid));
        let _ = writeln!(
            out,
            "   Size: {} | Quality: {} | Indexer: {}",
            format_size(c.size),
            or_placeholder(&c.quality, "Unknown"),
            or_placeholder(&c.indexer, "Unknown"),
        );
        let _ = writeln!(
            out,
            "   Seeders: {seeders} | CF Score: {:+} | Age: {}",
            c.custom_format_score,
            format_age(c.age_minutes),
        );
        let _ = writeln!(out, "   Languages: {languages}");
        let _ = write!(out, "   Custom Formats: {custom_formats}");
        if !c.indexer_flags.is_empty() {
            let _ = write!(out, " | Flags: [{}]", c.indexer_flags.join(", "));
        }
        out.push('\n');
        if c.is_selected {
            out.push_str("   ARR PREFERRED\n");
        }
    }
    out
}

/// Build the user prompt for one decision.
///
/// The system prompt comes from the per-profile prompt file; this part is
/// fixed and carries the media, the profile, and the candidate table.
///
/// # Examples
///
/// ```
/// use picker_core::{OverrideRequest, ReleaseCandidate, Service};
/// use picker_engine::prompt::build_user_prompt;
/// use std::collections::BTreeSet;
///
/// let req = OverrideRequest::new(
///     Service::Radarr,
///     "Dune",
///     "HD-1080p",
///     BTreeSet::new(),
///     vec![ReleaseCandidate { guid: "a".into(), title: "Dune.2021".into(), ..Default::default() }],
/// )
/// .unwrap();
/// let prompt = build_user_prompt(&req);
/// assert!(prompt.starts_with("Media: Dune\nQuality Profile: HD-1080p\n"));
/// assert!(prompt.contains("(1 total)"));
/// ```
pub fn build_user_prompt(request: &OverrideRequest) -> String {
    let title = single_line(request.media_title());
    format!(
        "Media: {title}\nQuality Profile: {}\n\nAvailable releases for '{title}' ({} total):\n\n{}\n{RESPONSE_INSTRUCTION}",
        single_line(request.profile_name()),
        request.candidates().len(),
        format_candidates(request.candidates()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use picker_core::Service;
    use std::collections::BTreeSet;

    fn sample() -> Vec<ReleaseCandidate> {
        vec![
            ReleaseCandidate {
                guid: "g1".into(),
                title: "Dune.Part.Two.2024.1080p.BluRay.x264-GRP".into(),
                size: 12_884_901_888,
                seeders: Some(250),
                quality: "Bluray-1080p".into(),
                languages: vec!["English".into()],
                custom_formats: vec!["x264".into(), "Repack".into()],
                indexer: "TorrentLeech".into(),
                custom_format_score: 150,
                age_minutes: 4320.0,
                indexer_flags: vec!["freeleech".into()],
                is_selected: true,
            },
            ReleaseCandidate {
                guid: "g2".into(),
                title: "Dune.Part.Two.2024.1080p.WEB-DL.x265".into(),
                size: 5_368_709_120,
                seeders: None,
                quality: "WEBDL-1080p".into(),
                indexer: "NZBgeek".into(),
                custom_format_score: -20,
                age_minutes: 90.0,
                ..Default::default()
            },
        ]
    }

    #[test]
    fn renders_every_field() {
        let table = format_candidates(&sample());
        let expected = "\
1. Dune.Part.Two.2024.1080p.BluRay.x264-GRP
   GUID: g1
   Size: 12.00 GB | Quality: Bluray-1080p | Indexer: TorrentLeech
   Seeders: 250 | CF Score: +150 | Age: 3d
   Languages: English
   Custom Formats: x264, Repack | Flags: [freeleech]
   ARR PREFERRED

2. Dune.Part.Two.2024.1080p.WEB-DL.x265
   GUID: g2
   Size: 5.00 GB | Quality: WEBDL-1080p | Indexer: NZBgeek
   Seeders: n/a | CF Score: -20 | Age: 1h
   Languages: Unknown
   Custom Formats: None
";
        assert_eq!(table, expected);
    }

    #[test]
    fn output_is_deterministic() {
        let candidates = sample();
        assert_eq!(format_candidates(&candidates), format_candidates(&candidates));
    }

    #[test]
    fn one_row_per_candidate_in_input_order() {
        let candidates: Vec<ReleaseCandidate> = (0..12)
            .map(|i| ReleaseCandidate {
                guid: format!("g{i}"),
                title: format!("Release {i}"),
                ..Default::default()
            })
            .collect();
        let table = format_candidates(&candidates);
        let headers: Vec<&str> = table
            .lines()
            .filter(|l| l.chars().next().is_some_and(|ch| ch.is_ascii_digit()))
            .collect();
        assert_eq!(headers.len(), candidates.len());
        for (i, header) in headers.iter().enumerate() {
            assert_eq!(*header, format!("{}. Release {i}", i + 1));
        }
    }

    #[test]
    fn multiline_titles_stay_on_one_row() {
        let candidates = vec![ReleaseCandidate {
            guid: "g".into(),
            title: "Evil\n2. Injected".into(),
            ..Default::default()
        }];
        let table = format_candidates(&candidates);
        assert!(table.starts_with("1. Evil 2. Injected\n"));
        assert_eq!(table.lines().filter(|l| l.starts_with("2.")).count(), 0);
    }

    #[test]
    fn missing_text_fields_use_placeholders() {
        let table = format_candidates(&[ReleaseCandidate {
            guid: "g".into(),
            ..Default::default()
        }]);
        assert!(table.starts_with("1. Unknown\n"));
        assert!(table.contains("Quality: Unknown | Indexer: Unknown"));
        assert!(table.contains("CF Score: +0 | Age: 0m"));
    }

    #[test]
    fn sizes_scale_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(734_003_200), "700.00 MB");
        assert_eq!(format_size(1_099_511_627_776), "1.00 TB");
        assert_eq!(format_size(u64::MAX), "16777216.00 TB");
    }

    #[test]
    fn ages_pick_largest_whole_unit() {
        assert_eq!(format_age(59.9), "59m");
        assert_eq!(format_age(60.0), "1h");
        assert_eq!(format_age(1439.0), "23h");
        assert_eq!(format_age(2880.0), "2d");
        assert_eq!(format_age(-3.0), "0m");
    }

    #[test]
    fn user_prompt_layout() {
        let req = OverrideRequest::new(
            Service::Sonarr,
            "Severance",
            "WEB-2160p",
            BTreeSet::new(),
            sample(),
        )
        .unwrap();
        let prompt = build_user_prompt(&req);
        assert!(prompt.starts_with(
            "Media: Severance\nQuality Profile: WEB-2160p\n\nAvailable releases for 'Severance' (2 total):\n\n1. "
        ));
        assert!(prompt.ends_with(
            "\nSelect the best release. Respond with JSON only: {\"choice\": <number>, \"reason\": \"<brief reason>\"}"
        ));
    }
}
