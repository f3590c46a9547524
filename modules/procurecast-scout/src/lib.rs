pub mod chrome;
pub mod documents;
pub mod error;
pub mod extractor;
pub mod fetch;
pub mod links;
pub mod news;
pub mod pdf;
pub mod resolver;
pub mod solicitations;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod throttle;

pub use chrome::ChromeFetcher;
pub use documents::{source_pages, DocumentHarvester, SourcePage};
pub use error::{ScoutError, ScoutResult};
pub use extractor::{extract_unprocessed, ExtractStats, ExtractionContext, Mention};
pub use fetch::{HttpFetcher, PageFetcher, Resource};
pub use links::{AssistedLinkFinder, ExtensionLinkFinder, LinkFinder, PageMarkup};
pub use news::NewsHarvester;
pub use resolver::resolve_region;
pub use solicitations::{Opportunity, OpportunitySource, PageQuery, RegistryHarvester, SamGovSource};
pub use stats::HarvestStats;
pub use throttle::Throttle;
