use shelfkeeper::storage::models::*;
use shelfkeeper::storage::Database;
use tempfile::tempdir;

fn setup(db: &Database) -> (i64, i64) {
    let library_id = db.insert_library("Books", Some("{authors}/{title}"), true).unwrap();
    let path_id = db.insert_library_path(library_id, "/srv/books").unwrap();
    (library_id, path_id)
}

fn new_book(library_id: i64, path_id: i64, file_name: &str) -> NewBook {
    NewBook {
        library_id,
        library_path_id: path_id,
        sub_path: "Author".to_string(),
        file_name: file_name.to_string(),
        book_type: BookFileType::from_file_name(file_name).unwrap(),
        file_size_kb: Some(512),
        hash: Some("abc".to_string()),
        metadata: BookMetadata {
            title: Some("Title".to_string()),
            authors: Some("Author".to_string()),
            series_name: Some("Saga".to_string()),
            series_number: Some(1.5),
            published_year: Some(1999),
        },
    }
}

fn new_additional(book_id: i64, path_id: i64, file_name: &str, kind: AdditionalFileKind) -> NewAdditionalFile {
    NewAdditionalFile {
        book_id,
        library_path_id: path_id,
        sub_path: "Author".to_string(),
        file_name: file_name.to_string(),
        kind,
        file_size_kb: Some(64),
        hash: Some(format!("hash-{}", file_name)),
    }
}

#[test]
fn test_library_round_trip() {
    let db = Database::open_in_memory().unwrap();
    let (library_id, path_id) = setup(&db);

    let library = db.get_library(library_id).unwrap().unwrap();
    assert_eq!(library.name, "Books");
    assert_eq!(library.naming_pattern.as_deref(), Some("{authors}/{title}"));
    assert!(library.watched);

    db.set_naming_pattern(library_id, None).unwrap();
    assert!(db.get_library(library_id).unwrap().unwrap().naming_pattern.is_none());

    let paths = db.get_library_paths(library_id).unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].id, path_id);
    assert_eq!(paths[0].path, "/srv/books");
    assert_eq!(db.list_libraries().unwrap().len(), 1);
    assert!(db.get_library(999).unwrap().is_none());
}

#[test]
fn test_insert_book_sets_both_hashes() {
    let db = Database::open_in_memory().unwrap();
    let (library_id, path_id) = setup(&db);
    let book_id = db.insert_book(&new_book(library_id, path_id, "a.epub")).unwrap();

    let book = db.get_book(book_id).unwrap().unwrap();
    assert_eq!(book.book_type, BookFileType::Epub);
    assert_eq!(book.initial_hash.as_deref(), Some("abc"));
    assert_eq!(book.current_hash.as_deref(), Some("abc"));
    assert!(!book.deleted);
    assert!(book.added_on.is_some());
    assert_eq!(book.metadata.series_number, Some(1.5));
    assert_eq!(book.metadata.published_year, Some(1999));

    db.update_book_hash(book_id, "def").unwrap();
    let book = db.get_book(book_id).unwrap().unwrap();
    assert_eq!(book.initial_hash.as_deref(), Some("abc"));
    assert_eq!(book.current_hash.as_deref(), Some("def"));
}

#[test]
fn test_soft_delete_restore_and_purge() {
    let db = Database::open_in_memory().unwrap();
    let (library_id, path_id) = setup(&db);
    let old = db.insert_book(&new_book(library_id, path_id, "old.epub")).unwrap();
    let recent = db.insert_book(&new_book(library_id, path_id, "recent.epub")).unwrap();
    let restored = db.insert_book(&new_book(library_id, path_id, "back.epub")).unwrap();

    db.soft_delete_book(old, "2020-01-01T00:00:00+00:00").unwrap();
    db.soft_delete_book(recent, "2024-06-01T00:00:00+00:00").unwrap();
    db.soft_delete_book(restored, "2020-01-01T00:00:00+00:00").unwrap();
    db.restore_book(restored, "2024-07-01T00:00:00+00:00").unwrap();

    let book = db.get_book(restored).unwrap().unwrap();
    assert!(!book.deleted);
    assert!(book.deleted_at.is_none());
    assert_eq!(book.added_on.as_deref(), Some("2024-07-01T00:00:00+00:00"));

    assert_eq!(db.get_books_for_library(library_id).unwrap().len(), 3);
    assert_eq!(db.purge_deleted_before("2023-01-01T00:00:00+00:00").unwrap(), 1);
    assert!(db.get_book(old).unwrap().is_none());
    assert!(db.get_book(recent).unwrap().unwrap().deleted);
}

#[test]
fn test_writes_to_missing_rows_fail() {
    let db = Database::open_in_memory().unwrap();
    assert!(db.soft_delete_book(7, "now").is_err());
    assert!(db.update_book_location(7, 1, 1, "", "a.epub").is_err());
    assert!(db.delete_additional_file(7).is_err());
}

#[test]
fn test_update_location() {
    let db = Database::open_in_memory().unwrap();
    let (library_id, path_id) = setup(&db);
    let other_library = db.insert_library("Other", None, false).unwrap();
    let other_path = db.insert_library_path(other_library, "/srv/other").unwrap();
    let book_id = db.insert_book(&new_book(library_id, path_id, "a.epub")).unwrap();

    db.update_book_location(book_id, other_library, other_path, "X/Y", "b.epub")
        .unwrap();

    let book = db.get_book(book_id).unwrap().unwrap();
    assert_eq!(book.library_id, other_library);
    assert_eq!(book.library_path_id, other_path);
    assert_eq!(book.sub_path, "X/Y");
    assert_eq!(book.file_name, "b.epub");
    assert!(db.get_books_for_library(library_id).unwrap().is_empty());
}

#[test]
fn test_promote_additional_file_is_atomic() {
    let db = Database::open_in_memory().unwrap();
    let (library_id, path_id) = setup(&db);
    let book_id = db.insert_book(&new_book(library_id, path_id, "a.epub")).unwrap();
    let pdf = db
        .insert_additional_file(&new_additional(book_id, path_id, "a.pdf", AdditionalFileKind::AlternativeFormat))
        .unwrap();

    let mut promoted = db.get_book(book_id).unwrap().unwrap();
    promoted.file_name = "a.pdf".to_string();
    promoted.book_type = BookFileType::Pdf;

    // Wrong additional file id: nothing may change.
    assert!(db.promote_additional_file(&promoted, pdf + 100).is_err());
    assert_eq!(db.get_book(book_id).unwrap().unwrap().file_name, "a.epub");

    db.promote_additional_file(&promoted, pdf).unwrap();
    let book = db.get_book(book_id).unwrap().unwrap();
    assert_eq!(book.file_name, "a.pdf");
    assert_eq!(book.book_type, BookFileType::Pdf);
    assert!(db.get_additional_files_for_book(book_id).unwrap().is_empty());
}

#[test]
fn test_additional_files_keep_insertion_order() {
    let db = Database::open_in_memory().unwrap();
    let (library_id, path_id) = setup(&db);
    let book_id = db.insert_book(&new_book(library_id, path_id, "a.epub")).unwrap();
    for name in ["a.pdf", "a-notes.txt", "a.mobi"] {
        let kind = if name.ends_with(".txt") {
            AdditionalFileKind::Supplementary
        } else {
            AdditionalFileKind::AlternativeFormat
        };
        db.insert_additional_file(&new_additional(book_id, path_id, name, kind))
            .unwrap();
    }

    let files = db.get_additional_files_for_book(book_id).unwrap();
    let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "a-notes.txt", "a.mobi"]);
    assert_eq!(files[1].kind, AdditionalFileKind::Supplementary);
    assert_eq!(files[0].initial_hash, files[0].current_hash);
    assert_eq!(db.get_additional_files_for_library(library_id).unwrap().len(), 3);
}

#[test]
fn test_hard_delete_cascades_to_additional_files() {
    let db = Database::open_in_memory().unwrap();
    let (library_id, path_id) = setup(&db);
    let book_id = db.insert_book(&new_book(library_id, path_id, "a.epub")).unwrap();
    db.insert_additional_file(&new_additional(book_id, path_id, "a.pdf", AdditionalFileKind::AlternativeFormat))
        .unwrap();

    db.delete_book(book_id).unwrap();

    assert!(db.get_book(book_id).unwrap().is_none());
    assert!(db.get_additional_files_for_library(library_id).unwrap().is_empty());
}

#[test]
fn test_open_file_database_twice() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("library.db");
    {
        let db = Database::open(&path).unwrap();
        setup(&db);
    }
    let db = Database::open(&path).unwrap();
    assert_eq!(db.list_libraries().unwrap().len(), 1);
}
