mod archive;
mod cache;

pub use archive::{Archive, ContainerFormat, DirectoryArchive};
pub use cache::{AssetFormat, ResourceCache, ResourceError};
