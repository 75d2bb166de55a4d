//! # Site "specs"
//!
//! Page-specific knowledge about the exchange portal: which URL opens a
//! ticker, which scripts drive the search form and the AJAX pager, which
//! selector means "the results table is there", and what shape the row
//! extraction script returns.
//!
//! ## What lives here
//! - **URL and script builders** for the company profile page.
//! - **Script classification** so fixture-backed sessions can answer the
//!   same scripts a browser would.
//!
//! ## What does **not** live here
//! - **Paging decisions** (`pager`), **merging** (`merge`), **persistence**
//!   (`store`). Specs only describe the page.
//!
//! In short: **`specs` knows how to talk to the page.** Other layers decide
//! when to fetch, when to stop, and what to keep.
pub mod isx;
