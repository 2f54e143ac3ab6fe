//! # oebmodel
//!
//! Reads EPUB/OEB ebook archives into a paginated, render-ready book model:
//! a streaming XML pipeline across the OPF package document, the optional
//! NCX table of contents, and the XHTML spine, flattened into a
//! cache-backed paragraph stream plus a contents tree.
//!
//! This crate only reads. It never writes or re-serializes a book, never
//! attempts to defeat DRM (an encrypted spine item always surfaces as a
//! placeholder paragraph), and never renders or paginates text for
//! display — that is a host UI's job, working from the model this crate
//! produces.
//!
//! ## Quick Start
//!
//! ```no_run
//! use oebmodel::{read_book, ReaderConfig};
//!
//! let config = ReaderConfig::new("/tmp/oebmodel-cache");
//! let result = read_book("input.epub".as_ref(), &config)?;
//! println!("{} ({} paragraphs)", result.book.title, result.model.main_text_model.paragraph_count());
//! # Ok::<(), oebmodel::Error>(())
//! ```
//!
//! Hosts that dispatch by file-type tag go through the plugin registry
//! instead of calling `read_book` directly:
//!
//! ```no_run
//! use oebmodel::{find_plugin, ReaderConfig};
//!
//! let plugin = find_plugin("ePub")?;
//! let config = ReaderConfig::default();
//! let result = (plugin.read_model)("input.epub".as_ref(), &config)?;
//! # Ok::<(), oebmodel::Error>(())
//! ```

pub mod allocator;
pub mod book_model;
pub mod book_reader;
pub mod config;
pub mod css;
pub mod error;
pub mod io;
pub mod lang;
pub mod ncx;
pub mod opf;
pub mod pipeline;
pub mod plugin;
pub mod text_model;
pub mod xhtml;
pub(crate) mod xml_util;

pub use book_model::{Book, BookModel};
pub use config::ReaderConfig;
pub use error::{Error, Result};
pub use lang::LanguageDetector;
pub use pipeline::{read_book, ReadResult};
pub use plugin::{find_plugin, PluginEntry, ShimStatus};
