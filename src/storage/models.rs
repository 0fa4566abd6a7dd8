use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::fmt;
use std::str::FromStr;

/// A library: one naming pattern over one or more root paths.
#[derive(Debug, Clone, PartialEq)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub naming_pattern: Option<String>,
    pub watched: bool,
}

/// A root directory of a library.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryPath {
    pub id: i64,
    pub library_id: i64,
    pub path: String,
}

/// Recognized book formats, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookFileType {
    Epub,
    Pdf,
    Cbx,
    Fb2,
    Mobi,
    Azw3,
}

impl BookFileType {
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, extension) = file_name.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "epub" => Some(BookFileType::Epub),
            "pdf" => Some(BookFileType::Pdf),
            "cbz" | "cbr" | "cb7" => Some(BookFileType::Cbx),
            "fb2" => Some(BookFileType::Fb2),
            "mobi" => Some(BookFileType::Mobi),
            "azw3" | "azw" => Some(BookFileType::Azw3),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookFileType::Epub => "epub",
            BookFileType::Pdf => "pdf",
            BookFileType::Cbx => "cbx",
            BookFileType::Fb2 => "fb2",
            BookFileType::Mobi => "mobi",
            BookFileType::Azw3 => "azw3",
        }
    }
}

impl fmt::Display for BookFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookFileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "epub" => Ok(BookFileType::Epub),
            "pdf" => Ok(BookFileType::Pdf),
            "cbx" => Ok(BookFileType::Cbx),
            "fb2" => Ok(BookFileType::Fb2),
            "mobi" => Ok(BookFileType::Mobi),
            "azw3" => Ok(BookFileType::Azw3),
            other => Err(format!("unknown book type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditionalFileKind {
    AlternativeFormat,
    Supplementary,
}

impl AdditionalFileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdditionalFileKind::AlternativeFormat => "alternative_format",
            AdditionalFileKind::Supplementary => "supplementary",
        }
    }
}

impl FromStr for AdditionalFileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alternative_format" => Ok(AdditionalFileKind::AlternativeFormat),
            "supplementary" => Ok(AdditionalFileKind::Supplementary),
            other => Err(format!("unknown additional file kind '{}'", other)),
        }
    }
}

macro_rules! text_column {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_column!(BookFileType);
text_column!(AdditionalFileKind);

/// Descriptive fields the naming pattern draws on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub authors: Option<String>,
    pub series_name: Option<String>,
    pub series_number: Option<f64>,
    pub published_year: Option<i32>,
}

/// The primary file of a book.
#[derive(Debug, Clone, PartialEq)]
pub struct BookRecord {
    pub id: i64,
    pub library_id: i64,
    pub library_path_id: i64,
    pub sub_path: String,
    pub file_name: String,
    pub book_type: BookFileType,
    pub file_size_kb: Option<i64>,
    pub initial_hash: Option<String>,
    pub current_hash: Option<String>,
    pub deleted: bool,
    pub deleted_at: Option<String>,
    pub added_on: Option<String>,
    pub metadata: BookMetadata,
}

/// A file attached to a book besides its primary file.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditionalFile {
    pub id: i64,
    pub book_id: i64,
    pub library_path_id: i64,
    pub sub_path: String,
    pub file_name: String,
    pub kind: AdditionalFileKind,
    pub file_size_kb: Option<i64>,
    pub initial_hash: Option<String>,
    pub current_hash: Option<String>,
}

/// Insert payload for a book; the id is assigned by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub library_id: i64,
    pub library_path_id: i64,
    pub sub_path: String,
    pub file_name: String,
    pub book_type: BookFileType,
    pub file_size_kb: Option<i64>,
    pub hash: Option<String>,
    pub metadata: BookMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAdditionalFile {
    pub book_id: i64,
    pub library_path_id: i64,
    pub sub_path: String,
    pub file_name: String,
    pub kind: AdditionalFileKind,
    pub file_size_kb: Option<i64>,
    pub hash: Option<String>,
}

/// Either table's row, as far as reconciliation is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedFile {
    Book(BookRecord),
    Additional(AdditionalFile),
}

impl TrackedFile {
    pub fn id(&self) -> i64 {
        match self {
            TrackedFile::Book(book) => book.id,
            TrackedFile::Additional(file) => file.id,
        }
    }

    pub fn library_path_id(&self) -> i64 {
        match self {
            TrackedFile::Book(book) => book.library_path_id,
            TrackedFile::Additional(file) => file.library_path_id,
        }
    }

    pub fn sub_path(&self) -> &str {
        match self {
            TrackedFile::Book(book) => &book.sub_path,
            TrackedFile::Additional(file) => &file.sub_path,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            TrackedFile::Book(book) => &book.file_name,
            TrackedFile::Additional(file) => &file.file_name,
        }
    }
}
