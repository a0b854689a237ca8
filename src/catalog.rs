use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoryCategory {
    Hushabies,
    #[serde(rename = "WhisperPedia Wonderings")]
    Wonderings,
    #[serde(rename = "Feather Stories")]
    FeatherStories,
}

impl StoryCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            StoryCategory::Hushabies => "Hushabies",
            StoryCategory::Wonderings => "WhisperPedia Wonderings",
            StoryCategory::FeatherStories => "Feather Stories",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Hushabies" => Some(StoryCategory::Hushabies),
            "WhisperPedia Wonderings" => Some(StoryCategory::Wonderings),
            "Feather Stories" => Some(StoryCategory::FeatherStories),
            _ => None,
        }
    }
}

/// Target playback length in minutes; `Untimed` ("0") doubles as the
/// "any length" filter value on the read paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timer {
    #[serde(rename = "0")]
    Untimed,
    #[serde(rename = "7")]
    Min7,
    #[serde(rename = "12")]
    Min12,
    #[serde(rename = "20")]
    Min20,
}

impl Timer {
    pub fn as_str(self) -> &'static str {
        match self {
            Timer::Untimed => "0",
            Timer::Min7 => "7",
            Timer::Min12 => "12",
            Timer::Min20 => "20",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "0" => Some(Timer::Untimed),
            "7" => Some(Timer::Min7),
            "12" => Some(Timer::Min12),
            "20" => Some(Timer::Min20),
            _ => None,
        }
    }
}

/// The eight blob references of one playable part: four language audio tracks
/// and the matching lyric-timing files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTracks {
    pub english_file: String,
    pub deutsch_file: String,
    pub francais_file: String,
    pub espanol_file: String,
    pub english_lrc: String,
    pub deutsch_lrc: String,
    pub francais_lrc: String,
    pub espanol_lrc: String,
}

impl MediaTracks {
    /// A part missing any of the eight references is incomplete and must not
    /// surface in browse results.
    pub fn is_complete(&self) -> bool {
        self.blob_paths().iter().all(|p| !p.is_empty())
    }

    pub fn blob_paths(&self) -> [&str; 8] {
        [
            &self.english_file,
            &self.deutsch_file,
            &self.francais_file,
            &self.espanol_file,
            &self.english_lrc,
            &self.deutsch_lrc,
            &self.francais_lrc,
            &self.espanol_lrc,
        ]
    }
}

/// Partial-update payload: absent slots are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTracksUpdate {
    #[serde(default)]
    pub english_file: Option<String>,
    #[serde(default)]
    pub deutsch_file: Option<String>,
    #[serde(default)]
    pub francais_file: Option<String>,
    #[serde(default)]
    pub espanol_file: Option<String>,
    #[serde(default)]
    pub english_lrc: Option<String>,
    #[serde(default)]
    pub deutsch_lrc: Option<String>,
    #[serde(default)]
    pub francais_lrc: Option<String>,
    #[serde(default)]
    pub espanol_lrc: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub name: String,
    pub cover_image: String,
    pub category: StoryCategory,
    pub sherpa: String,
    pub timer: Timer,
    /// Ordered child part ids. May contain ids of parts that were deleted
    /// directly; readers resolve and skip misses.
    pub part_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPart {
    pub id: String,
    pub story_id: String,
    pub part_idx: i64,
    #[serde(flatten)]
    pub tracks: MediaTracks,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoryPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sherpa: Option<String>,
    #[serde(default)]
    pub timer: Option<String>,
}

/// Full-replacement update: every field below must be present, changed or not.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStoryPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sherpa: Option<String>,
    #[serde(default)]
    pub timer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPartPayload {
    #[serde(default)]
    pub part_idx: Option<i64>,
    #[serde(flatten)]
    pub tracks: MediaTracksUpdate,
}

/// Validated story fields handed to the store; id and timestamps are the
/// store's concern.
#[derive(Debug, Clone)]
pub struct NewStory {
    pub name: String,
    pub cover_image: String,
    pub category: StoryCategory,
    pub sherpa: String,
    pub timer: Timer,
}

#[derive(Debug, Clone)]
pub struct StoryUpdate {
    pub name: String,
    pub cover_image: String,
    pub category: StoryCategory,
    pub sherpa: String,
    pub timer: Option<Timer>,
}

#[derive(Debug, Clone)]
pub struct NewPart {
    pub story_id: String,
    pub part_idx: i64,
    pub tracks: MediaTracks,
}

#[derive(Debug, Clone, Default)]
pub struct StoryFilter {
    pub category: Option<StoryCategory>,
    pub timer: Option<Timer>,
}

impl StoryFilter {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.timer.is_none()
    }
}

#[async_trait]
pub trait StoryStore: Send + Sync {
    async fn insert_story(&self, story: NewStory) -> Result<Story, AppError>;
    async fn get_story(&self, id: &str) -> Result<Option<Story>, AppError>;
    async fn list_stories(
        &self,
        filter: &StoryFilter,
        page: i64,
        limit: i64,
    ) -> Result<Vec<Story>, AppError>;
    async fn list_story_ids(&self) -> Result<Vec<String>, AppError>;
    async fn update_story(&self, id: &str, update: StoryUpdate) -> Result<Option<Story>, AppError>;
    async fn delete_story(&self, id: &str) -> Result<Option<Story>, AppError>;

    /// Inserts the part and appends its id to the parent's ordered list in the
    /// same store mutation.
    async fn insert_part(&self, part: NewPart) -> Result<StoryPart, AppError>;
    async fn get_part(&self, id: &str) -> Result<Option<StoryPart>, AppError>;
    async fn parts_of_story(&self, story_id: &str) -> Result<Vec<StoryPart>, AppError>;
    async fn update_part_tracks(&self, id: &str, tracks: &MediaTracks) -> Result<(), AppError>;
    async fn delete_part(&self, id: &str) -> Result<Option<StoryPart>, AppError>;
    /// Removes every part of a story, returning the deleted rows so the caller
    /// can scrub their blobs.
    async fn delete_parts_of_story(&self, story_id: &str) -> Result<Vec<StoryPart>, AppError>;
    async fn count_parts(&self) -> Result<i64, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: String,
    pub image: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryPayload {
    pub name: String,
    pub description: String,
    pub image: String,
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn create_category(&self, payload: CategoryPayload) -> Result<Category, AppError>;
    async fn get_category(&self, id: &str) -> Result<Option<Category>, AppError>;
    async fn list_categories(&self, page: i64, limit: i64) -> Result<Vec<Category>, AppError>;
    async fn update_category(
        &self,
        id: &str,
        payload: CategoryPayload,
    ) -> Result<Option<Category>, AppError>;
    async fn delete_category(&self, id: &str) -> Result<Option<Category>, AppError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sherpa {
    pub id: String,
    pub title: String,
    pub description: String,
    pub image: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SherpaPayload {
    pub title: String,
    pub description: String,
    pub image: String,
}

#[async_trait]
pub trait SherpaStore: Send + Sync {
    async fn create_sherpa(&self, payload: SherpaPayload) -> Result<Sherpa, AppError>;
    async fn get_sherpa(&self, id: &str) -> Result<Option<Sherpa>, AppError>;
    async fn list_sherpas(&self, page: i64, limit: i64) -> Result<Vec<Sherpa>, AppError>;
    async fn update_sherpa(
        &self,
        id: &str,
        payload: SherpaPayload,
    ) -> Result<Option<Sherpa>, AppError>;
    async fn delete_sherpa(&self, id: &str) -> Result<Option<Sherpa>, AppError>;
}
