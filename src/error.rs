use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("login failed: {0}")]
    Login(String),
    #[error("not logged in; run `thumbshelf login` first")]
    NotLoggedIn,
    #[error("no bucket given and the connection has no default bucket")]
    NoBucket,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("folder {0} already exists, choose a different name")]
    FolderExists(String),
    #[error("invalid folder name {name:?}: {reason}")]
    InvalidFolderName { name: String, reason: &'static str },
    #[error("refusing to delete the bucket root")]
    RootDeletion,
    #[error("no images selected")]
    NothingSelected,
    #[error("no folder is open")]
    NoActiveFolder,
    #[error("{0} is not in the current view")]
    UnknownItem(String),
    #[error("thumbnail generation failed: {0}")]
    Thumbnail(#[from] image::ImageError),
    #[error("{0}")]
    ConfigPath(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Validation errors the user can fix by changing their input.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Error::FolderExists(_)
                | Error::InvalidFolderName { .. }
                | Error::NothingSelected
                | Error::NoActiveFolder
                | Error::RootDeletion
                | Error::NoBucket
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
