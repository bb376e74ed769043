//! cryptr-relay – Registry und Relay-Schleife
//!
//! Dieser Crate implementiert den Kern des Relays: die nebenlaeufige
//! Client-Registry, den Dispatcher fuer Unicast/Broadcast und die
//! Verbindungs-State-Machine. Der TCP-Transport liegt hier, der
//! WebSocket-Transport im Server-Crate.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (RelayServer) / WebSocket (/chat)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Lese-Task + ein Schreib-Task)
//!     |  State Machine: Verbindend -> Registrierend -> Aktiv -> Schliessend -> Geschlossen
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- Registrierung  (IdentityRequest -> IdentityResponse)
//!     +-- Unicast        (entschluesseln, fuer das Ziel neu verschluesseln)
//!     +-- Broadcast      (pro Empfaenger eigener Ciphertext)
//!     +-- Quittung       (ContentAck an den Absender)
//!
//! ClientRegistry – DashMap ClientId -> ClientRecord
//! ```

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use connection::{ClientConnection, TrennGrund, VerbindungsZustand};
pub use dispatcher::{MessageDispatcher, Zustellung};
pub use error::{RelayError, RelayResult};
pub use registry::{ClientHandle, ClientRecord, ClientRegistry};
pub use server_state::{RelayConfig, RelayState};
pub use tcp::RelayServer;
