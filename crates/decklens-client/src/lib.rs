//! # decklens-client
//!
//! Talks to the deck processing API: uploads a deck and a study document,
//! polls the resulting job, and downloads the processed deck.
//!
//! ## Components
//!
//! - [`HttpDeckApi`]: reqwest implementation of the [`DeckApi`] trait
//! - [`Poller`]: one cancellable fixed-interval status poll task at a time
//! - [`DeckProcessor`]: ties a [`decklens_core::Session`] to the API and
//!   broadcasts [`FlowEvent`]s
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use decklens_client::{ClientConfig, DeckProcessor, HttpDeckApi};
//! use decklens_core::FileSlot;
//!
//! # async fn example() -> decklens_core::Result<()> {
//! let config = ClientConfig::load()?;
//! let api = Arc::new(HttpDeckApi::new(&config)?);
//! let mut processor = DeckProcessor::new(api, &config);
//!
//! let session = processor.session_mut();
//! session.select_path(FileSlot::Deck, Path::new("bio.apkg"))?;
//! session.select_path(FileSlot::Study, Path::new("ch3.pdf"))?;
//! session.set_tag_prefix("cell bio");
//!
//! let result = processor.run().await?;
//! println!("{} cards scored", result.statistics.total_cards);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod flow;
pub mod poller;

pub use api::{extract_detail, DeckApi, HttpDeckApi};
pub use config::{ClientConfig, ConfigError, StatusRoute};
pub use flow::{DeckProcessor, FlowEvent};
pub use poller::{PollEvent, PollHandle, Poller, PollerConfig};
