//! Client-side fetch layer for the public catalog
//!
//! Used by the `meshmart-feed` binary and by anything else that consumes
//! `/api/models` over HTTP.

pub mod decode;
pub mod fallback;
pub mod feed;
pub mod listing;
pub mod policy;

pub use decode::{decode_listings, DecodeOutcome, Listing, ValidationCache};
pub use fallback::placeholder_listings;
pub use feed::{FeedOrigin, FeedState, HttpSource, ModelFeed, ModelSource};
pub use listing::{filter_category, filter_creator, paginate, search, sort, Page, SortOrder, DEFAULT_PAGE_SIZE};
pub use policy::{fetch_with_policy, Backoff, FetchError, RetryPolicy};
