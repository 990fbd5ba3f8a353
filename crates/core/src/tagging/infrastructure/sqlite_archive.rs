use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::shared::face_box::FaceBox;
use crate::tagging::domain::archive::{ArchiveError, FacePositionStore, IdentityStore, ImageCatalog};
use crate::tagging::domain::face_position::{ImageId, StoredFacePosition};
use crate::tagging::domain::identity::{Identity, NewIdentity, TagId};

/// Tables this archive reads and writes. Only created when missing; the
/// archive never migrates an existing schema.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS piwigo_images (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL,
    file TEXT NOT NULL,
    date_available TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS piwigo_tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    url_name TEXT NOT NULL,
    lastmodified TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS piwigo_image_tag (
    image_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    PRIMARY KEY (image_id, tag_id)
);
CREATE TABLE IF NOT EXISTS face_tag_positions (
    image_id INTEGER NOT NULL,
    tag_id INTEGER NOT NULL,
    top INTEGER NOT NULL,
    lft INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    image_width INTEGER NOT NULL,
    image_height INTEGER NOT NULL,
    PRIMARY KEY (image_id, tag_id)
);
";

/// Name pattern shared by every anonymous placeholder tag.
const ANONYMOUS_NAME_PATTERN: &str = "Unidentified Person%";

/// Raw `face_tag_positions` row before validation.
struct PositionRow {
    image_id: ImageId,
    tag_id: TagId,
    top: i64,
    left: i64,
    width: i64,
    height: i64,
    image_width: i64,
    image_height: i64,
}

/// Piwigo-style photo archive in a SQLite database.
///
/// Owns the connection for the duration of a run; every image's writes are
/// committed in a single transaction.
pub struct SqliteArchive {
    conn: Connection,
}

impl SqliteArchive {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let conn = Connection::open(path).map_err(query_err("open archive"))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, ArchiveError> {
        let conn = Connection::open_in_memory().map_err(query_err("open archive"))?;
        Ok(Self { conn })
    }

    /// Creates any missing tables.
    pub fn create_schema(&self) -> Result<(), ArchiveError> {
        self.conn
            .execute_batch(SCHEMA)
            .map_err(query_err("create schema"))
    }

    /// Registers an image; returns its id.
    pub fn add_image(&self, path: &str, date_available: &str) -> Result<ImageId, ArchiveError> {
        let file = Path::new(path)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.conn
            .execute(
                "INSERT INTO piwigo_images (path, file, date_available) VALUES (?1, ?2, ?3)",
                params![path, file, date_available],
            )
            .map_err(query_err("add image"))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn row_to_position(row: &Row) -> rusqlite::Result<PositionRow> {
        Ok(PositionRow {
            image_id: row.get(0)?,
            tag_id: row.get(1)?,
            top: row.get(2)?,
            left: row.get(3)?,
            width: row.get(4)?,
            height: row.get(5)?,
            image_width: row.get(6)?,
            image_height: row.get(7)?,
        })
    }

    fn row_to_identity(row: &Row) -> rusqlite::Result<Identity> {
        Ok(Identity {
            id: row.get(0)?,
            name: row.get(1)?,
            url_name: row.get(2)?,
        })
    }

    fn query_paths(
        &self,
        operation: &'static str,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<String>, ArchiveError> {
        let mut stmt = self.conn.prepare(sql).map_err(query_err(operation))?;
        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))
            .map_err(query_err(operation))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err(operation))
    }
}

impl PositionRow {
    fn validate(self) -> Result<StoredFacePosition, ArchiveError> {
        let invalid = |field, value| ArchiveError::InvalidRecord {
            image_id: self.image_id,
            tag_id: self.tag_id,
            field,
            value,
        };
        let to_i32 = |field, value: i64| i32::try_from(value).map_err(|_| invalid(field, value));
        let dimension = |field, value: i64| match u32::try_from(value) {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(invalid(field, value)),
        };

        let face_box = FaceBox::new(
            to_i32("lft", self.left)?,
            to_i32("top", self.top)?,
            to_i32("width", self.width)?,
            to_i32("height", self.height)?,
        );
        if face_box.width < 0 {
            return Err(invalid("width", self.width));
        }
        if face_box.height < 0 {
            return Err(invalid("height", self.height));
        }
        if i32::try_from(face_box.right()).is_err() {
            return Err(invalid("width", self.width));
        }
        if i32::try_from(face_box.bottom()).is_err() {
            return Err(invalid("height", self.height));
        }

        Ok(StoredFacePosition {
            image_id: self.image_id,
            tag_id: self.tag_id,
            face_box,
            image_width: dimension("image_width", self.image_width)?,
            image_height: dimension("image_height", self.image_height)?,
        })
    }
}

impl ImageCatalog for SqliteArchive {
    fn image_id(&self, path: &str, file_name: &str) -> Result<Option<ImageId>, ArchiveError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM piwigo_images WHERE path = ?1 OR file = ?2 LIMIT 2")
            .map_err(query_err("image lookup"))?;
        let ids = stmt
            .query_map(params![path, file_name], |row| row.get::<_, ImageId>(0))
            .map_err(query_err("image lookup"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err("image lookup"))?;

        match ids.as_slice() {
            [] => Ok(None),
            [id] => Ok(Some(*id)),
            _ => Err(ArchiveError::AmbiguousImage {
                path: path.to_string(),
            }),
        }
    }

    fn image_paths_by_id(&self, start: ImageId, end: ImageId) -> Result<Vec<String>, ArchiveError> {
        self.query_paths(
            "images by id",
            "SELECT path FROM piwigo_images WHERE id >= ?1 AND id <= ?2 ORDER BY id",
            params![start, end],
        )
    }

    fn image_paths_by_date(&self, start: &str, end: &str) -> Result<Vec<String>, ArchiveError> {
        self.query_paths(
            "images by date",
            "SELECT path FROM piwigo_images \
             WHERE date_available >= ?1 AND date_available <= ?2 ORDER BY id",
            params![start, end],
        )
    }
}

impl IdentityStore for SqliteArchive {
    fn anonymous_identities(&self) -> Result<Vec<Identity>, ArchiveError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, url_name FROM piwigo_tags WHERE name LIKE ?1 ORDER BY id")
            .map_err(query_err("anonymous identities"))?;
        let rows = stmt
            .query_map([ANONYMOUS_NAME_PATTERN], Self::row_to_identity)
            .map_err(query_err("anonymous identities"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err("anonymous identities"))
    }

    fn create_identities(&mut self, identities: &[NewIdentity]) -> Result<(), ArchiveError> {
        let tx = self
            .conn
            .transaction()
            .map_err(query_err("create identities"))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO piwigo_tags (name, url_name, lastmodified) \
                     VALUES (?1, ?2, datetime('now'))",
                )
                .map_err(query_err("create identities"))?;
            for identity in identities {
                stmt.execute(params![identity.name, identity.url_name])
                    .map_err(query_err("create identities"))?;
            }
        }
        tx.commit().map_err(query_err("create identities"))
    }

    fn url_name(&self, tag_id: TagId) -> Result<Option<String>, ArchiveError> {
        self.conn
            .query_row(
                "SELECT url_name FROM piwigo_tags WHERE id = ?1",
                [tag_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err("tag url name"))
    }
}

impl FacePositionStore for SqliteArchive {
    fn face_positions(&self, image_id: ImageId) -> Result<Vec<StoredFacePosition>, ArchiveError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT image_id, tag_id, top, lft, width, height, image_width, image_height \
                 FROM face_tag_positions WHERE image_id = ?1 ORDER BY top, lft",
            )
            .map_err(query_err("face positions"))?;
        let rows = stmt
            .query_map([image_id], Self::row_to_position)
            .map_err(query_err("face positions"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err("face positions"))?;
        rows.into_iter().map(PositionRow::validate).collect()
    }

    fn save_face_positions(
        &mut self,
        new: &[StoredFacePosition],
        updated: &[StoredFacePosition],
    ) -> Result<(), ArchiveError> {
        if new.is_empty() && updated.is_empty() {
            return Ok(());
        }
        let err = query_err("save face positions");
        let tx = self.conn.transaction().map_err(err)?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO face_tag_positions \
                     (image_id, tag_id, top, lft, width, height, image_width, image_height) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(err)?;
            let mut link = tx
                .prepare("INSERT OR IGNORE INTO piwigo_image_tag (image_id, tag_id) VALUES (?1, ?2)")
                .map_err(err)?;
            for p in new {
                insert.execute(position_params(p)).map_err(err)?;
                link.execute(params![p.image_id, p.tag_id]).map_err(err)?;
            }

            let mut update = tx
                .prepare(
                    "UPDATE face_tag_positions \
                     SET top = ?3, lft = ?4, width = ?5, height = ?6, \
                         image_width = ?7, image_height = ?8 \
                     WHERE image_id = ?1 AND tag_id = ?2",
                )
                .map_err(err)?;
            for p in updated {
                update.execute(position_params(p)).map_err(err)?;
            }
        }
        tx.commit().map_err(err)
    }
}

fn position_params(p: &StoredFacePosition) -> [i64; 8] {
    [
        p.image_id,
        p.tag_id,
        p.face_box.top as i64,
        p.face_box.left as i64,
        p.face_box.width as i64,
        p.face_box.height as i64,
        p.image_width as i64,
        p.image_height as i64,
    ]
}

fn query_err(operation: &'static str) -> impl Fn(rusqlite::Error) -> ArchiveError + Copy {
    move |e| ArchiveError::Query {
        operation,
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive() -> SqliteArchive {
        let archive = SqliteArchive::open_in_memory().unwrap();
        archive.create_schema().unwrap();
        archive
    }

    fn position(image_id: ImageId, tag_id: TagId, left: i32, top: i32) -> StoredFacePosition {
        StoredFacePosition {
            image_id,
            tag_id,
            face_box: FaceBox::new(left, top, 40, 50),
            image_width: 800,
            image_height: 600,
        }
    }

    fn image_tags(archive: &SqliteArchive) -> Vec<(ImageId, TagId)> {
        let mut stmt = archive
            .conn
            .prepare("SELECT image_id, tag_id FROM piwigo_image_tag ORDER BY image_id, tag_id")
            .unwrap();
        stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<Vec<_>>>()
            .unwrap()
    }

    // ── Image catalog ────────────────────────────────────────────────

    #[test]
    fn test_image_lookup_by_path_or_file_name() {
        let archive = archive();
        let id = archive.add_image("./upload/2020/01/a.jpg", "2020-01-05").unwrap();

        assert_eq!(
            archive.image_id("./upload/2020/01/a.jpg", "x.jpg").unwrap(),
            Some(id)
        );
        assert_eq!(archive.image_id("./upload/other", "a.jpg").unwrap(), Some(id));
        assert_eq!(archive.image_id("./upload/other", "b.jpg").unwrap(), None);
    }

    #[test]
    fn test_ambiguous_image_lookup() {
        let archive = archive();
        archive.add_image("./upload/2020/a.jpg", "2020-01-01").unwrap();
        archive.add_image("./upload/2021/a.jpg", "2021-01-01").unwrap();

        assert!(matches!(
            archive.image_id("./upload/a.jpg", "a.jpg"),
            Err(ArchiveError::AmbiguousImage { .. })
        ));
    }

    #[test]
    fn test_paths_by_id_range_is_inclusive() {
        let archive = archive();
        for name in ["a", "b", "c", "d"] {
            archive
                .add_image(&format!("./upload/{name}.jpg"), "2020-01-01")
                .unwrap();
        }

        let paths = archive.image_paths_by_id(2, 3).unwrap();

        assert_eq!(paths, vec!["./upload/b.jpg", "./upload/c.jpg"]);
    }

    #[test]
    fn test_paths_by_date_range() {
        let archive = archive();
        archive.add_image("./upload/a.jpg", "2020-01-01 10:00:00").unwrap();
        archive.add_image("./upload/b.jpg", "2020-02-01 10:00:00").unwrap();
        archive.add_image("./upload/c.jpg", "2020-03-01 10:00:00").unwrap();

        let paths = archive
            .image_paths_by_date("2020-01-15", "2020-02-28")
            .unwrap();

        assert_eq!(paths, vec!["./upload/b.jpg"]);
    }

    // ── Identities ───────────────────────────────────────────────────

    #[test]
    fn test_created_identities_are_listed_in_id_order() {
        let mut archive = archive();
        archive
            .create_identities(&[
                NewIdentity::anonymous(1),
                NewIdentity {
                    name: "Jane Doe".to_string(),
                    url_name: "jane_doe".to_string(),
                },
                NewIdentity::anonymous(2),
            ])
            .unwrap();

        let anonymous = archive.anonymous_identities().unwrap();

        let names: Vec<&str> = anonymous.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Unidentified Person #1", "Unidentified Person #2"]);
        assert!(anonymous[0].id < anonymous[1].id);
    }

    #[test]
    fn test_url_name_lookup() {
        let mut archive = archive();
        archive.create_identities(&[NewIdentity::anonymous(4)]).unwrap();
        let id = archive.anonymous_identities().unwrap()[0].id;

        assert_eq!(
            archive.url_name(id).unwrap().as_deref(),
            Some("unidentified_person_#4")
        );
        assert_eq!(archive.url_name(id + 100).unwrap(), None);
    }

    // ── Face positions ───────────────────────────────────────────────

    #[test]
    fn test_positions_ordered_by_top_then_left() {
        let mut archive = archive();
        archive
            .save_face_positions(
                &[
                    position(1, 10, 300, 50),
                    position(1, 11, 100, 50),
                    position(1, 12, 0, 10),
                    position(2, 13, 0, 0),
                ],
                &[],
            )
            .unwrap();

        let tags: Vec<TagId> = archive
            .face_positions(1)
            .unwrap()
            .iter()
            .map(|p| p.tag_id)
            .collect();

        assert_eq!(tags, vec![12, 11, 10]);
    }

    #[test]
    fn test_new_positions_are_linked_to_image() {
        let mut archive = archive();
        archive
            .save_face_positions(&[position(1, 10, 0, 0), position(1, 11, 50, 0)], &[])
            .unwrap();

        assert_eq!(image_tags(&archive), vec![(1, 10), (1, 11)]);
    }

    #[test]
    fn test_existing_image_tag_link_is_kept() {
        let mut archive = archive();
        archive
            .conn
            .execute("INSERT INTO piwigo_image_tag (image_id, tag_id) VALUES (1, 10)", [])
            .unwrap();

        archive
            .save_face_positions(&[position(1, 10, 0, 0)], &[])
            .unwrap();

        assert_eq!(image_tags(&archive), vec![(1, 10)]);
    }

    #[test]
    fn test_update_overwrites_geometry_in_place() {
        let mut archive = archive();
        archive.save_face_positions(&[position(1, 10, 0, 0)], &[]).unwrap();

        let moved = StoredFacePosition {
            face_box: FaceBox::new(7, 8, 90, 95),
            image_width: 1600,
            image_height: 1200,
            ..position(1, 10, 0, 0)
        };
        archive.save_face_positions(&[], &[moved]).unwrap();

        assert_eq!(archive.face_positions(1).unwrap(), vec![moved]);
    }

    #[test]
    fn test_duplicate_key_rolls_back_whole_batch() {
        let mut archive = archive();
        archive.save_face_positions(&[position(1, 10, 0, 0)], &[]).unwrap();

        let result = archive.save_face_positions(
            &[position(1, 11, 50, 0), position(1, 10, 90, 0)],
            &[],
        );

        assert!(matches!(result, Err(ArchiveError::Query { .. })));
        assert_eq!(archive.face_positions(1).unwrap().len(), 1);
        assert_eq!(image_tags(&archive), vec![(1, 10)]);
    }

    #[test]
    fn test_invalid_stored_width_is_rejected() {
        let archive = archive();
        archive
            .conn
            .execute(
                "INSERT INTO face_tag_positions VALUES (1, 10, 0, 0, 40, 40, 0, 600)",
                [],
            )
            .unwrap();

        let err = archive.face_positions(1).unwrap_err();

        assert!(matches!(
            err,
            ArchiveError::InvalidRecord {
                field: "image_width",
                value: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_negative_box_size_is_rejected() {
        let archive = archive();
        archive
            .conn
            .execute(
                "INSERT INTO face_tag_positions VALUES (1, 10, 0, 0, -5, 40, 800, 600)",
                [],
            )
            .unwrap();

        assert!(matches!(
            archive.face_positions(1),
            Err(ArchiveError::InvalidRecord { field: "width", .. })
        ));
    }

    #[test]
    fn test_box_reaching_past_i32_range_is_rejected() {
        let archive = archive();
        archive
            .conn
            .execute(
                "INSERT INTO face_tag_positions VALUES (1, 10, 0, 2147483637, 100, 40, 800, 600)",
                [],
            )
            .unwrap();

        assert!(matches!(
            archive.face_positions(1),
            Err(ArchiveError::InvalidRecord {
                field: "width",
                value: 100,
                ..
            })
        ));
    }

    #[test]
    fn test_missing_tables_surface_as_query_errors() {
        let archive = SqliteArchive::open_in_memory().unwrap();
        assert!(matches!(
            archive.face_positions(1),
            Err(ArchiveError::Query {
                operation: "face positions",
                ..
            })
        ));
    }
}
