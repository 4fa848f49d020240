//! MIFARE DESFire EV1 native command set with secure messaging
//!
//! [`DesFire`] runs over any [`BlockTransport`], normally an
//! [`Iso14443Card`]. After [`DesFire::auth`] every command keeps the session
//! key's CBC chain in step with the card: commands and answers are MACed or
//! encrypted as the command or the file's communication mode requires.

use std::fmt;

use bytes::BytesMut;
use nexum_picc_core::{PcdTransceiver, Picc, ProtocolConfig};
use nexum_picc_iso14443::{BlockTransport, Iso14443Card};
use tracing::debug;

mod application;
pub mod constants;
mod exchange;
mod files;
mod session;
mod status;
mod types;

pub use exchange::{CommMode, Exchange, Response};
pub use session::Session;
pub use status::Status;
pub use types::{
    AppId, AppKeyType, CardVersion, FileCommMode, FileKind, FilePermissions, FileSettings,
    KeySettingInfo, KeySettings, VersionInfo,
};

use crate::{Error, Result};

/// A DESFire card
pub struct DesFire<B: BlockTransport> {
    transport: B,
    session: Option<Session>,
    cmac_buffer: BytesMut,
    selected_app: Option<AppId>,
}

impl<B: BlockTransport> fmt::Debug for DesFire<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesFire")
            .field("transport", &self.transport)
            .field("session", &self.session)
            .field("selected_app", &self.selected_app)
            .finish()
    }
}

impl<B: BlockTransport> DesFire<B> {
    /// Wrap a transport to a card selected at layer 4
    pub fn new(transport: B) -> Self {
        Self {
            transport,
            session: None,
            cmac_buffer: BytesMut::new(),
            selected_app: None,
        }
    }

    /// Access the transport
    pub const fn transport(&self) -> &B {
        &self.transport
    }

    /// Access the transport mutably
    pub const fn transport_mut(&mut self) -> &mut B {
        &mut self.transport
    }

    /// Release the transport
    pub fn into_inner(self) -> B {
        self.transport
    }

    /// Whether a session is established
    pub const fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Key number of the current session
    pub fn authenticated_key(&self) -> Option<u8> {
        self.session.as_ref().map(Session::key_number)
    }

    /// Application selected by the last [`select_app`](Self::select_app)
    pub const fn selected_app(&self) -> Option<AppId> {
        self.selected_app
    }

    /// Deselect the card at layer 4; the session ends
    pub fn deselect(&mut self) -> Result<()> {
        self.invalidate();
        Ok(self.transport.deselect()?)
    }

    /// Deselect and halt the card; the session ends
    pub fn halt(&mut self) -> Result<()> {
        self.invalidate();
        Ok(self.transport.halt()?)
    }

    /// Drop the session and its CMAC state
    fn invalidate(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(key_number = session.key_number(), "Session ended");
        }
        self.cmac_buffer.clear();
    }

    fn require_session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(Error::Unauthenticated)
    }
}

impl<T: PcdTransceiver> DesFire<Iso14443Card<T>> {
    /// Select a type A card at layer 4 and wrap it
    pub fn activate(pcd: T, picc: Picc, config: ProtocolConfig) -> Result<Self> {
        let mut card = Iso14443Card::new(pcd, picc, config);
        let ats = card.select()?;
        debug!(uid = %card.picc().uid, fsc = ats.fsc, "DESFire card selected");
        Ok(Self::new(card))
    }

    /// Bring a card back that was lost or halted and select it again
    ///
    /// Returns `false` when a different card answered. The session ends in
    /// either case.
    pub fn resume_communication(&mut self) -> Result<bool> {
        self.invalidate();
        self.selected_app = None;
        if !self.transport.resume_communication()? {
            return Ok(false);
        }
        self.transport.select()?;
        Ok(true)
    }
}
