/// UPnP playback compatibility ranking
///
/// The weights are tuned from what played reliably in VLC over DLNA, not
/// derived from any protocol document. They live behind
/// [`CompatibilityPolicy`] so they can change without touching the composer.

use nas_catalog_core::{FileType, MediaFile};

/// Characters that tend to break URL handling in players
const SPECIAL_CHARACTERS: &[char] = &['\'', '(', ')', '[', ']', '&', '%'];

/// Facts about the whole candidate set that individual scores depend on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    /// Mean path length (in characters) over all video files
    pub mean_path_len: f64,
}

impl ScoringContext {
    pub fn from_videos(videos: &[&MediaFile]) -> Self {
        let mean_path_len = if videos.is_empty() {
            0.0
        } else {
            let total: usize = videos.iter().map(|f| f.path.chars().count()).sum();
            total as f64 / videos.len() as f64
        };
        Self { mean_path_len }
    }
}

/// Ranks video files by how likely they are to play over UPnP
pub trait CompatibilityPolicy: Send + Sync {
    fn score(&self, file: &MediaFile, context: &ScoringContext) -> i32;

    /// Files scoring below this are dropped
    fn threshold(&self) -> i32 {
        3
    }

    /// Maximum number of files returned by [`CompatibilityPolicy::select`]
    fn limit(&self) -> usize {
        20
    }

    /// Score every video, drop those under the threshold, and return the
    /// best ones. Ties keep their input order.
    fn select<'a>(&self, files: &'a [MediaFile]) -> Vec<&'a MediaFile> {
        let videos: Vec<&MediaFile> = files
            .iter()
            .filter(|f| f.file_type == FileType::Video)
            .collect();
        if videos.is_empty() {
            return Vec::new();
        }

        let context = ScoringContext::from_videos(&videos);
        let mut scored: Vec<(&MediaFile, i32)> = videos
            .into_iter()
            .map(|f| (f, self.score(f, &context)))
            .filter(|(_, score)| *score >= self.threshold())
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(self.limit());
        scored.into_iter().map(|(f, _)| f).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreWeights {
    pub dlna_11_0: i32,
    pub dlna_0_0: i32,
    pub dlna_8_0: i32,
    pub mp4: i32,
    pub mkv: i32,
    pub avi: i32,
    pub not_hidden: i32,
    pub short_path: i32,
    /// Applied when at most `few_special_max` special characters occur
    pub few_special: i32,
    /// Applied when more than `many_special_min` special characters occur
    pub many_special: i32,
    pub few_special_max: usize,
    pub many_special_min: usize,
    pub ascii_only: i32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            dlna_11_0: 3,
            dlna_0_0: 2,
            dlna_8_0: 1,
            mp4: 3,
            mkv: 2,
            avi: 1,
            not_hidden: 2,
            short_path: 1,
            few_special: 1,
            many_special: -1,
            few_special_max: 2,
            many_special_min: 5,
            ascii_only: 1,
        }
    }
}

/// Default policy: DLNA profile markers in the URL, container format,
/// and how "clean" the file name is
#[derive(Debug, Clone, PartialEq)]
pub struct DlnaHeuristicPolicy {
    pub weights: ScoreWeights,
    pub threshold: i32,
    pub limit: usize,
}

impl Default for DlnaHeuristicPolicy {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            threshold: 3,
            limit: 20,
        }
    }
}

impl CompatibilityPolicy for DlnaHeuristicPolicy {
    fn score(&self, file: &MediaFile, context: &ScoringContext) -> i32 {
        let w = &self.weights;
        let name = file.name.as_str();
        let lower_name = name.to_lowercase();
        let mut score = 0;

        if file.path.contains("DLNA-11-0") {
            score += w.dlna_11_0;
        } else if file.path.contains("DLNA-0-0") {
            score += w.dlna_0_0;
        } else if file.path.contains("DLNA-8-0") {
            score += w.dlna_8_0;
        }

        if lower_name.ends_with(".mp4") {
            score += w.mp4;
        } else if lower_name.ends_with(".mkv") {
            score += w.mkv;
        } else if lower_name.ends_with(".avi") {
            score += w.avi;
        }

        if !name.starts_with("._") {
            score += w.not_hidden;
        }

        if (file.path.chars().count() as f64) < context.mean_path_len {
            score += w.short_path;
        }

        let special = name.chars().filter(|c| SPECIAL_CHARACTERS.contains(c)).count();
        if special <= w.few_special_max {
            score += w.few_special;
        } else if special > w.many_special_min {
            score += w.many_special;
        }

        if name.is_ascii() {
            score += w.ascii_only;
        }

        score
    }

    fn threshold(&self) -> i32 {
        self.threshold
    }

    fn limit(&self) -> usize {
        self.limit
    }
}
