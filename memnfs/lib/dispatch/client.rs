//! Client id negotiation and leases.

use bytes::Bytes;

use crate::nfs::ResBody;

use super::{Dispatcher, OpResult};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Dispatcher {
    pub(super) fn set_client_id(&self, verifier: [u8; 8], id: Bytes) -> OpResult {
        let (clientid, verifier) = self.state.set_client_id(verifier, id)?;
        Ok(ResBody::SetClientId { clientid, verifier })
    }

    pub(super) fn set_client_id_confirm(&self, clientid: u64, verifier: [u8; 8]) -> OpResult {
        self.state.confirm_client(clientid, verifier)?;
        Ok(ResBody::Empty)
    }

    pub(super) fn renew(&self, clientid: u64) -> OpResult {
        self.state.renew(clientid)?;
        Ok(ResBody::Empty)
    }

    pub(super) fn release_lock_owner(&self, clientid: u64) -> OpResult {
        self.state.release_lock_owner(clientid)?;
        Ok(ResBody::Empty)
    }
}
