mod catalog;
mod chapters;
mod extracted;
mod merged;
mod series;

pub use self::catalog::CatalogMetadata;
pub use self::chapters::{Chapter, Chapters};
pub use self::extracted::ExtractedMetadata;
pub use self::merged::MergedMetadata;
pub use self::series::SeriesPosition;
