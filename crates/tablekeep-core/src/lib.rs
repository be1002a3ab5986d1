// ABOUTME: Core library for tablekeep: the value model, codecs, risk tiers, and progress channel.
// ABOUTME: Everything here is storage- and engine-agnostic; persistence lives in tablekeep-store.

pub mod archive;
pub mod codec;
pub mod notify;
pub mod risk;
pub mod table;
pub mod value;

pub use archive::{
    ArchiveError, ArchiveManifest, ArchivedTable, BuiltArchive, MissingEntryPolicy,
    ParsedArchive, TableDescriptor, TableFailure, build_archive, parse_archive,
};
pub use codec::{CodecError, decode_rows, encode_rows};
pub use notify::{
    NewNotification, NotificationCenter, NotificationEvent, NotificationKind,
    NotificationRecord, NotificationUpdate,
};
pub use risk::{RiskLevel, RiskThresholds, RiskWarning, classify};
pub use table::{Column, ColumnKind, Row, TableNameError, TableSnapshot, validate_table_name};
pub use value::{BigInteger, Value};
