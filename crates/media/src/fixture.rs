//! Canonical library tree for tests.
//!
//! Seeds an in-memory library database with one TV section (show → season →
//! three episodes), one movie section, and one music section (artist →
//! album → track, for exercising non-markerable targets). Not gated behind
//! `#[cfg(test)]` so dependent crates can build their fixtures on top.

use crate::Database;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::Path;

/// Runtime of every seeded episode, milliseconds.
pub const EPISODE_DURATION: i64 = 600_000;
/// Runtime of the seeded movie, milliseconds.
pub const MOVIE_DURATION: i64 = 5_400_000;

/// Ids of the rows seeded by [`seed`].
#[derive(Debug, Clone, Copy)]
pub struct Fixture {
    pub tv_section: i64,
    pub movie_section: i64,
    pub music_section: i64,
    pub show: i64,
    pub season: i64,
    pub episodes: [i64; 3],
    pub movie: i64,
    pub track: i64,
}

/// Create a file-backed library database with the schema applied, for
/// tests that need a reopenable file (suspend/resume) rather than an
/// in-memory pool.
pub async fn create_file(path: impl AsRef<Path>) -> Result<Database> {
    let path = path.as_ref();
    std::fs::File::create(path).or_raise(|| ErrorKind::Database)?;
    let db = Database::connect(path).await?;
    sqlx::query(crate::db::LIBRARY_SCHEMA).execute(db.pool()).await.or_raise(|| ErrorKind::Database)?;
    Ok(db)
}

/// Seed the canonical tree into `db` and return its ids.
pub async fn seed(db: &Database) -> Result<Fixture> {
    let fixture = Fixture {
        tv_section: 1,
        movie_section: 2,
        music_section: 3,
        show: 10,
        season: 100,
        episodes: [1000, 1001, 1002],
        movie: 2000,
        track: 3000,
    };

    for (id, name, kind) in [(1i64, "TV Shows", 2i64), (2, "Movies", 1), (3, "Music", 8)] {
        sqlx::query("INSERT INTO library_sections (id, name, section_type) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(kind)
            .execute(db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
    }

    // (id, metadata_type, parent, section, title, duration)
    let items: [(i64, i64, Option<i64>, i64, &str, Option<i64>); 9] = [
        (10, 2, None, 1, "Paddington Green", None),
        (100, 3, Some(10), 1, "Season 1", None),
        (1000, 4, Some(100), 1, "Marmalade Day", Some(EPISODE_DURATION)),
        (1001, 4, Some(100), 1, "A Hard Stare", Some(EPISODE_DURATION)),
        (1002, 4, Some(100), 1, "The Browns", Some(EPISODE_DURATION)),
        (2000, 1, None, 2, "Feature Presentation", Some(MOVIE_DURATION)),
        (30, 8, None, 3, "The Skiffle Four", None),
        (300, 9, Some(30), 3, "Washboard Favourites", None),
        (3000, 10, Some(300), 3, "Teatime Stomp", Some(180_000)),
    ];
    for (id, kind, parent, section, title, duration) in items {
        sqlx::query(
            "INSERT INTO metadata_items (id, metadata_type, parent_id, library_section_id, title, duration) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(kind)
        .bind(parent)
        .bind(section)
        .bind(title)
        .bind(duration)
        .execute(db.pool())
        .await
        .or_raise(|| ErrorKind::Database)?;
    }

    Ok(fixture)
}
