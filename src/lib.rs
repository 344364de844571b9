//! # Vault Linker
//!
//! Keeps machine-generated annotations (suggested links, suggested tags,
//! stable identifiers) in a folder of Markdown notes up to date without
//! disturbing anything the user wrote.
//!
//! Each note is split into three regions:
//!
//! ```text
//! ---
//! id: 0b6f1c52-...          <- frontmatter: identifier lives here
//! ---
//! User-authored text.       <- tracked body: fingerprinted, never edited
//! <!-- HASH_BOUNDARY -->
//! ## Suggested Links        <- annotation zone: machine-owned sections
//! <!-- LINKS_START -->
//! - [[Other Note]]
//! <!-- LINKS_END -->
//! ```
//!
//! Scores come from an external scorer's output file; this crate only
//! decides whether a note needs reprocessing and splices the data in so
//! that re-running any command reproduces the same bytes.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌────────────────┐   ┌──────────────────────┐
//! │ DocumentStore │──▶│  Orchestrator  │──▶│ Pass: annotate, ids, │
//! │  FS / memory  │   │ scope, exclude │   │ fingerprint, clean   │
//! └───────────────┘   │ cache, batches │   └──────────┬───────────┘
//!                     └────────────────┘              │
//!                                         ┌───────────┴──────────┐
//!                                         ▼                      ▼
//!                                 ┌──────────────┐      ┌───────────────┐
//!                                 │ scores file  │      │  fingerprint  │
//!                                 │ (read-only)  │      │ ledger (JSON) │
//!                                 └──────────────┘      └───────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`store`] | Document store trait, filesystem and in-memory stores |
//! | [`exclude`] | Folder and filename exclusion rules |
//! | [`cache`] | Mtime-keyed content cache |
//! | [`frontmatter`] | Frontmatter split, parse and patch |
//! | [`fingerprint`] | Tracked-body fingerprints and boundary insertion |
//! | [`sections`] | Idempotent annotation-section rewrites |
//! | [`identity`] | Stable identifier assignment |
//! | [`scores`] | Scorer output loading |
//! | [`ledger`] | Fingerprint ledger shared with the scorer |
//! | [`batch`] | Batched, cancellable traversal |
//! | [`progress`] | Progress reporting on stderr |
//! | [`annotate`] | `annotate` and `clean` commands |
//! | [`hash_cmd`] | `fingerprint` and `boundary` commands |
//! | [`ids_cmd`] | `ids` command |

pub mod annotate;
pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod exclude;
pub mod fingerprint;
pub mod frontmatter;
pub mod hash_cmd;
pub mod identity;
pub mod ids_cmd;
pub mod ledger;
pub mod models;
pub mod progress;
pub mod scores;
pub mod sections;
pub mod store;
