//! Feed construction and serialization.
//!
//! # Submodules
//!
//! - [`feed`]: Groups parsed records by release date into a [`crate::models::FeedDocument`]
//! - [`rss`]: Serializes a feed document as RSS 2.0 XML
//!
//! # Output Structure
//!
//! ```text
//! <rss version="2.0">
//!   <channel>
//!     <title/> <link/> <description/> <lastBuildDate/>
//!     <item>            # one per release date, newest first
//!       <title>Market Place Item Update on 1/10/2023</title>
//!       <pubDate/>
//!       <description>Section - Product</description>
//!     </item>
//!   </channel>
//! </rss>
//! ```

pub mod feed;
pub mod rss;
