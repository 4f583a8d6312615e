pub mod fetch;
pub mod inbox;
pub mod init;
pub mod keys;
pub mod share;
pub mod users;
pub mod verify;
pub mod version;

pub use fetch::Fetch;
pub use inbox::Inbox;
pub use init::Init;
pub use keys::Keys;
pub use share::Share;
pub use users::Users;
pub use verify::Verify;
pub use version::Version;

use common::records::SharedFileRecord;

/// One line per incoming file, as shown by `inbox` and `fetch`
pub(crate) fn describe_record(record: &SharedFileRecord) -> String {
    format!(
        "{} | {} ({}) | from {} <{}> | {}",
        record.id,
        record.name,
        record.mime(),
        record.author_name,
        record.author_id,
        record.date
    )
}
