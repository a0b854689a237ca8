use std::sync::Arc;

use rand::seq::IndexedRandom;
use serde::Serialize;

use crate::blobstore::{BlobStore, delete_quietly, with_lrc_mount};
use crate::catalog::{
    CreateStoryPayload, MediaTracks, MediaTracksUpdate, NewPart, NewPartPayload, NewStory, Story,
    StoryCategory, StoryFilter, StoryPart, StoryStore, StoryUpdate, Timer, UpdateStoryPayload,
};
use crate::error::{AppError, Result};

/// Guest-browse record. Only the first record of a page carries playable
/// media; the rest are display teasers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestStory {
    pub is_free: bool,
    pub name: String,
    pub cover_image: String,
    pub category: StoryCategory,
    pub sherpa: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer: Option<Timer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<StoryPart>>,
}

/// Maintains referential and completeness invariants across the
/// story/part/blob lifecycles. Record mutations are authoritative; blob
/// cleanup is best-effort and never blocks them.
pub struct CatalogManager {
    stories: Arc<dyn StoryStore>,
    blobs: Arc<dyn BlobStore>,
}

impl CatalogManager {
    pub fn new(stories: Arc<dyn StoryStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { stories, blobs }
    }

    pub async fn create_story(&self, payload: CreateStoryPayload) -> Result<Story> {
        let name = required(payload.name, "name")?;
        let cover_image = required(payload.cover_image, "cover image")?;
        let category = parse_category(&required(payload.category, "category")?)?;
        let sherpa = required(payload.sherpa, "sherpa")?;
        let timer = match payload.timer {
            Some(s) => parse_timer(&s)?,
            None => Timer::Untimed,
        };

        // Duplicate story names are allowed; only taxonomy names are unique.
        let result = self
            .stories
            .insert_story(NewStory {
                name,
                cover_image: cover_image.clone(),
                category,
                sherpa,
                timer,
            })
            .await;
        if result.is_err() {
            // The upload already happened; don't leave the cover orphaned.
            delete_quietly(self.blobs.as_ref(), &cover_image).await;
        }
        result
    }

    /// Full-replacement update: every field must be supplied, changed or not.
    pub async fn update_story(&self, id: &str, payload: UpdateStoryPayload) -> Result<Story> {
        let name = required(payload.name, "name")?;
        let cover_image = required(payload.cover_image, "cover image")?;
        let category = parse_category(&required(payload.category, "category")?)?;
        let sherpa = required(payload.sherpa, "sherpa")?;
        let timer = payload.timer.as_deref().map(parse_timer).transpose()?;

        let existing = self
            .stories
            .get_story(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Story not found!".into()))?;

        if cover_image != existing.cover_image {
            delete_quietly(self.blobs.as_ref(), &existing.cover_image).await;
        }

        self.stories
            .update_story(
                id,
                StoryUpdate {
                    name,
                    cover_image,
                    category,
                    sherpa,
                    timer,
                },
            )
            .await?
            .ok_or_else(|| AppError::NotFound("Story not found!".into()))
    }

    /// Cascades: story row, cover blob, every child part's eight blobs, and
    /// the child part rows themselves.
    pub async fn delete_story(&self, id: &str) -> Result<Story> {
        let story = self
            .stories
            .delete_story(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Story not found for delete!".into()))?;

        delete_quietly(self.blobs.as_ref(), &story.cover_image).await;

        let parts = self.stories.delete_parts_of_story(id).await?;
        for part in &parts {
            for path in part.tracks.blob_paths() {
                delete_quietly(self.blobs.as_ref(), path).await;
            }
        }

        Ok(story)
    }

    pub async fn add_part(&self, story_id: &str, payload: NewPartPayload) -> Result<StoryPart> {
        self.stories
            .get_story(story_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Story not found!".into()))?;

        let part_idx = payload
            .part_idx
            .ok_or_else(|| AppError::InvalidState("Part index is required!".into()))?;

        let tracks = normalized_tracks(payload.tracks);
        self.stories
            .insert_part(NewPart {
                story_id: story_id.to_string(),
                part_idx,
                tracks,
            })
            .await
    }

    /// Per-slot partial update: a supplied slot that differs from the stored
    /// value replaces it and scrubs the old blob; absent slots are untouched.
    pub async fn update_part(&self, part_id: &str, payload: MediaTracksUpdate) -> Result<StoryPart> {
        let mut part = self
            .stories
            .get_part(part_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Part not found!".into()))?;

        let slots: [(Option<String>, &mut String, bool); 8] = [
            (payload.english_file, &mut part.tracks.english_file, false),
            (payload.deutsch_file, &mut part.tracks.deutsch_file, false),
            (payload.francais_file, &mut part.tracks.francais_file, false),
            (payload.espanol_file, &mut part.tracks.espanol_file, false),
            (payload.english_lrc, &mut part.tracks.english_lrc, true),
            (payload.deutsch_lrc, &mut part.tracks.deutsch_lrc, true),
            (payload.francais_lrc, &mut part.tracks.francais_lrc, true),
            (payload.espanol_lrc, &mut part.tracks.espanol_lrc, true),
        ];

        let mut stale: Vec<String> = Vec::new();
        for (incoming, stored, is_lrc) in slots {
            let Some(incoming) = incoming else { continue };
            let incoming = if is_lrc {
                with_lrc_mount(&incoming)
            } else {
                incoming
            };
            if incoming != *stored {
                if !stored.is_empty() {
                    stale.push(stored.clone());
                }
                *stored = incoming;
            }
        }

        self.stories.update_part_tracks(part_id, &part.tracks).await?;

        for path in stale {
            delete_quietly(self.blobs.as_ref(), &path).await;
        }

        Ok(part)
    }

    /// Deletes the row and its eight blobs; the parent's ordered list is left
    /// alone and readers skip the dangling id.
    pub async fn delete_part(&self, part_id: &str) -> Result<StoryPart> {
        let part = self
            .stories
            .delete_part(part_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Part not found for delete!".into()))?;

        for path in part.tracks.blob_paths() {
            delete_quietly(self.blobs.as_ref(), path).await;
        }

        Ok(part)
    }

    /// Anonymous browse. Filtered requests get a stable creation-ordered
    /// page; unfiltered requests get a random sample so repeat visitors see
    /// variety. Exactly one record per response is fully playable.
    pub async fn guest_sample(
        &self,
        page: i64,
        limit: i64,
        filter: &StoryFilter,
    ) -> Result<Vec<GuestStory>> {
        let stories = if filter.is_empty() {
            let ids = self.stories.list_story_ids().await?;
            let sampled: Vec<String> = {
                let mut rng = rand::rng();
                ids.choose_multiple(&mut rng, limit.max(0) as usize)
                    .cloned()
                    .collect()
            };
            let mut out = Vec::with_capacity(sampled.len());
            for id in sampled {
                if let Some(story) = self.stories.get_story(&id).await? {
                    out.push(story);
                }
            }
            out
        } else {
            self.stories.list_stories(filter, page, limit).await?
        };

        let mut out = Vec::with_capacity(stories.len());
        for (index, story) in stories.into_iter().enumerate() {
            if index == 0 {
                let parts: Vec<StoryPart> = self
                    .stories
                    .parts_of_story(&story.id)
                    .await?
                    .into_iter()
                    .filter(|p| p.tracks.is_complete())
                    .collect();
                out.push(GuestStory {
                    is_free: true,
                    name: story.name,
                    cover_image: story.cover_image,
                    category: story.category,
                    sherpa: story.sherpa,
                    timer: Some(story.timer),
                    parts: Some(parts),
                });
            } else {
                out.push(GuestStory {
                    is_free: false,
                    name: story.name,
                    cover_image: story.cover_image,
                    category: story.category,
                    sherpa: story.sherpa,
                    timer: None,
                    parts: None,
                });
            }
        }
        Ok(out)
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::InvalidState(format!("All fields are required: missing {field}!")))
}

fn parse_category(s: &str) -> Result<StoryCategory> {
    StoryCategory::parse(s)
        .ok_or_else(|| AppError::InvalidState(format!("Unknown category: {s}!")))
}

fn parse_timer(s: &str) -> Result<Timer> {
    Timer::parse(s).ok_or_else(|| AppError::InvalidState(format!("Unknown timer: {s}!")))
}

/// Missing slots are stored empty (the part stays incomplete); lyric-timing
/// paths are normalized onto the `lrc/` mount.
fn normalized_tracks(update: MediaTracksUpdate) -> MediaTracks {
    MediaTracks {
        english_file: update.english_file.unwrap_or_default(),
        deutsch_file: update.deutsch_file.unwrap_or_default(),
        francais_file: update.francais_file.unwrap_or_default(),
        espanol_file: update.espanol_file.unwrap_or_default(),
        english_lrc: update.english_lrc.map(|p| with_lrc_mount(&p)).unwrap_or_default(),
        deutsch_lrc: update.deutsch_lrc.map(|p| with_lrc_mount(&p)).unwrap_or_default(),
        francais_lrc: update.francais_lrc.map(|p| with_lrc_mount(&p)).unwrap_or_default(),
        espanol_lrc: update.espanol_lrc.map(|p| with_lrc_mount(&p)).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::FsBlobStore;
    use crate::db::Database;
    use tempfile::tempdir;

    struct Harness {
        _dir: tempfile::TempDir,
        db: Arc<Database>,
        blobs: Arc<FsBlobStore>,
        manager: CatalogManager,
    }

    async fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Arc::new(Database::new(db_path.to_str().unwrap()).await.unwrap());
        let blobs = Arc::new(FsBlobStore::new(dir.path().join("uploads")).unwrap());
        let manager = CatalogManager::new(db.clone(), blobs.clone());
        Harness {
            _dir: dir,
            db,
            blobs,
            manager,
        }
    }

    fn story_payload(name: &str, cover: &str) -> CreateStoryPayload {
        CreateStoryPayload {
            name: Some(name.into()),
            cover_image: Some(cover.into()),
            category: Some("Hushabies".into()),
            sherpa: Some("Maya".into()),
            timer: Some("7".into()),
        }
    }

    async fn upload(blobs: &FsBlobStore, slot: &str) -> String {
        blobs.store(b"bytes", slot).await.unwrap()
    }

    async fn uploaded_part_payload(h: &Harness, idx: i64) -> NewPartPayload {
        NewPartPayload {
            part_idx: Some(idx),
            tracks: MediaTracksUpdate {
                english_file: Some(upload(&h.blobs, "EnglishFile").await),
                deutsch_file: Some(upload(&h.blobs, "DeutschFile").await),
                francais_file: Some(upload(&h.blobs, "FrancaisFile").await),
                espanol_file: Some(upload(&h.blobs, "EspanolFile").await),
                english_lrc: Some(upload(&h.blobs, "lrc/EnglishLRC").await),
                deutsch_lrc: Some(upload(&h.blobs, "lrc/DeutschLRC").await),
                francais_lrc: Some(upload(&h.blobs, "lrc/FrancaisLRC").await),
                espanol_lrc: Some(upload(&h.blobs, "lrc/EspanolLRC").await),
            },
        }
    }

    #[tokio::test]
    async fn create_story_requires_every_field() {
        let h = harness().await;
        let mut payload = story_payload("Night Train", "whisperCoverImage/c.png");
        payload.category = None;
        let err = h.manager.create_story(payload).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let story = h
            .manager
            .create_story(story_payload("Night Train", "whisperCoverImage/c.png"))
            .await
            .unwrap();
        assert!(story.part_ids.is_empty());
    }

    #[tokio::test]
    async fn add_part_rejects_missing_parent() {
        let h = harness().await;
        let payload = NewPartPayload {
            part_idx: Some(1),
            tracks: MediaTracksUpdate::default(),
        };
        let err = h.manager.add_part("missing", payload).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn add_part_requires_an_index() {
        let h = harness().await;
        let story = h
            .manager
            .create_story(story_payload("S", "whisperCoverImage/c.png"))
            .await
            .unwrap();
        let err = h
            .manager
            .add_part(
                &story.id,
                NewPartPayload {
                    part_idx: None,
                    tracks: MediaTracksUpdate::default(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn add_part_normalizes_lyric_paths_onto_the_lrc_mount() {
        let h = harness().await;
        let story = h
            .manager
            .create_story(story_payload("S", "whisperCoverImage/c.png"))
            .await
            .unwrap();

        let part = h
            .manager
            .add_part(
                &story.id,
                NewPartPayload {
                    part_idx: Some(1),
                    tracks: MediaTracksUpdate {
                        english_file: Some("EnglishFile/a.mp3".into()),
                        english_lrc: Some("EnglishLRC/a.lrc".into()),
                        deutsch_lrc: Some("lrc/DeutschLRC/a.lrc".into()),
                        ..MediaTracksUpdate::default()
                    },
                },
            )
            .await
            .unwrap();

        assert_eq!(part.tracks.english_lrc, "lrc/EnglishLRC/a.lrc");
        assert_eq!(part.tracks.deutsch_lrc, "lrc/DeutschLRC/a.lrc");
        // Audio slots are not remounted.
        assert_eq!(part.tracks.english_file, "EnglishFile/a.mp3");

        let parent = h.db.get_story(&story.id).await.unwrap().unwrap();
        assert_eq!(parent.part_ids, vec![part.id]);
    }

    #[tokio::test]
    async fn update_part_touches_only_supplied_slots() {
        let h = harness().await;
        let story = h
            .manager
            .create_story(story_payload("S", "whisperCoverImage/c.png"))
            .await
            .unwrap();
        let payload = uploaded_part_payload(&h, 1).await;
        let part = h.manager.add_part(&story.id, payload).await.unwrap();

        let old_english = part.tracks.english_file.clone();
        let old_deutsch = part.tracks.deutsch_file.clone();
        let replacement = upload(&h.blobs, "EnglishFile").await;

        let updated = h
            .manager
            .update_part(
                &part.id,
                MediaTracksUpdate {
                    english_file: Some(replacement.clone()),
                    ..MediaTracksUpdate::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.tracks.english_file, replacement);
        assert_eq!(updated.tracks.deutsch_file, old_deutsch);
        // The replaced slot's old blob is gone; untouched slots keep theirs.
        assert!(!h.blobs.exists(&old_english).await.unwrap());
        assert!(h.blobs.exists(&old_deutsch).await.unwrap());

        let stored = h.db.get_part(&part.id).await.unwrap().unwrap();
        assert_eq!(stored.tracks, updated.tracks);
    }

    #[tokio::test]
    async fn update_part_with_identical_value_deletes_nothing() {
        let h = harness().await;
        let story = h
            .manager
            .create_story(story_payload("S", "whisperCoverImage/c.png"))
            .await
            .unwrap();
        let payload = uploaded_part_payload(&h, 1).await;
        let part = h.manager.add_part(&story.id, payload).await.unwrap();

        let same = part.tracks.english_file.clone();
        h.manager
            .update_part(
                &part.id,
                MediaTracksUpdate {
                    english_file: Some(same.clone()),
                    ..MediaTracksUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(h.blobs.exists(&same).await.unwrap());
    }

    #[tokio::test]
    async fn update_story_replaces_cover_blob_when_changed() {
        let h = harness().await;
        let old_cover = upload(&h.blobs, "whisperCoverImage").await;
        let story = h
            .manager
            .create_story(story_payload("S", &old_cover))
            .await
            .unwrap();

        // Full-replacement validation: a partial payload is rejected.
        let err = h
            .manager
            .update_story(
                &story.id,
                UpdateStoryPayload {
                    name: Some("S2".into()),
                    cover_image: None,
                    category: None,
                    sherpa: None,
                    timer: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(h.blobs.exists(&old_cover).await.unwrap());

        let new_cover = upload(&h.blobs, "whisperCoverImage").await;
        let updated = h
            .manager
            .update_story(
                &story.id,
                UpdateStoryPayload {
                    name: Some("S2".into()),
                    cover_image: Some(new_cover.clone()),
                    category: Some("Feather Stories".into()),
                    sherpa: Some("Maya".into()),
                    timer: Some("12".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.cover_image, new_cover);
        assert_eq!(updated.category, StoryCategory::FeatherStories);
        assert!(!h.blobs.exists(&old_cover).await.unwrap());
    }

    #[tokio::test]
    async fn delete_story_scrubs_every_blob_and_part_row() {
        let h = harness().await;
        let cover = upload(&h.blobs, "whisperCoverImage").await;
        let story = h.manager.create_story(story_payload("S", &cover)).await.unwrap();

        let payload = uploaded_part_payload(&h, 1).await;
        let part = h.manager.add_part(&story.id, payload).await.unwrap();
        let part_blobs: Vec<String> =
            part.tracks.blob_paths().iter().map(|p| p.to_string()).collect();

        h.manager.delete_story(&story.id).await.unwrap();

        assert!(!h.blobs.exists(&cover).await.unwrap());
        for path in &part_blobs {
            assert!(!h.blobs.exists(path).await.unwrap(), "blob {path} survived");
        }
        assert!(h.db.get_story(&story.id).await.unwrap().is_none());
        assert!(h.db.get_part(&part.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_part_returns_the_record_and_scrubs_blobs() {
        let h = harness().await;
        let story = h
            .manager
            .create_story(story_payload("S", "whisperCoverImage/c.png"))
            .await
            .unwrap();
        let payload = uploaded_part_payload(&h, 1).await;
        let part = h.manager.add_part(&story.id, payload).await.unwrap();

        let deleted = h.manager.delete_part(&part.id).await.unwrap();
        assert_eq!(deleted.id, part.id);
        for path in deleted.tracks.blob_paths() {
            assert!(!h.blobs.exists(path).await.unwrap());
        }
        // Reference behavior: the parent's ordered list keeps the id.
        let parent = h.db.get_story(&story.id).await.unwrap().unwrap();
        assert_eq!(parent.part_ids, vec![part.id]);
    }

    #[tokio::test]
    async fn guest_sample_marks_only_the_first_record_playable() {
        let h = harness().await;
        for i in 0..3 {
            let story = h
                .manager
                .create_story(story_payload(&format!("S{i}"), "whisperCoverImage/c.png"))
                .await
                .unwrap();
            let payload = uploaded_part_payload(&h, i + 1).await;
            h.manager.add_part(&story.id, payload).await.unwrap();
        }

        let out = h
            .manager
            .guest_sample(1, 3, &StoryFilter::default())
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0].is_free);
        assert!(out[0].parts.is_some());
        assert_eq!(out[0].parts.as_ref().unwrap().len(), 1);
        for teaser in &out[1..] {
            assert!(!teaser.is_free);
            assert!(teaser.parts.is_none());
            assert!(teaser.timer.is_none());
        }
    }

    #[tokio::test]
    async fn guest_sample_with_filters_is_a_stable_page() {
        let h = harness().await;
        for i in 0..3 {
            h.manager
                .create_story(story_payload(&format!("S{i}"), "whisperCoverImage/c.png"))
                .await
                .unwrap();
        }
        let filter = StoryFilter {
            category: Some(StoryCategory::Hushabies),
            timer: None,
        };
        let first = h.manager.guest_sample(1, 2, &filter).await.unwrap();
        let second = h.manager.guest_sample(1, 2, &filter).await.unwrap();
        let names =
            |page: &[GuestStory]| page.iter().map(|s| s.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&first), vec!["S0".to_string(), "S1".to_string()]);
        assert_eq!(names(&first), names(&second));
    }

    #[tokio::test]
    async fn guest_sample_hides_incomplete_parts() {
        let h = harness().await;
        let story = h
            .manager
            .create_story(story_payload("S", "whisperCoverImage/c.png"))
            .await
            .unwrap();
        h.manager
            .add_part(
                &story.id,
                NewPartPayload {
                    part_idx: Some(1),
                    tracks: MediaTracksUpdate {
                        english_file: Some("EnglishFile/a.mp3".into()),
                        ..MediaTracksUpdate::default()
                    },
                },
            )
            .await
            .unwrap();

        let out = h
            .manager
            .guest_sample(1, 1, &StoryFilter::default())
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        // The free slot is present but the half-uploaded part is hidden.
        assert!(out[0].parts.as_ref().unwrap().is_empty());
    }
}
