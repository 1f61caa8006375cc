use async_trait::async_trait;
use tails_file_service::TailsFileDistributor;
use url::Url;

use crate::{error::*, ledger::RevocationRegistryDefinition};

/// Publishes the tails file of a freshly created revocation registry and tells where holders can
/// download it from.
#[async_trait]
pub trait TailsFileService: Send + Sync {
    async fn upload_tails_file(
        &self,
        rev_reg_def: &RevocationRegistryDefinition,
    ) -> AgentResult<Url>;
}

/// Uploads tails files to a tails server.
pub struct FullTailsFileService {
    distributor: TailsFileDistributor,
    tails_server_base_url: Url,
}

impl FullTailsFileService {
    pub fn new(distributor: TailsFileDistributor, tails_server_base_url: Url) -> Self {
        Self {
            distributor,
            tails_server_base_url,
        }
    }

    pub fn tails_server_base_url(&self) -> &Url {
        &self.tails_server_base_url
    }
}

#[async_trait]
impl TailsFileService for FullTailsFileService {
    async fn upload_tails_file(
        &self,
        rev_reg_def: &RevocationRegistryDefinition,
    ) -> AgentResult<Url> {
        debug!(
            "FullTailsFileService::upload_tails_file >> rev_reg_def_id: {}, tails_location: {}",
            rev_reg_def.id,
            rev_reg_def.tails_location.display()
        );
        let url = self
            .distributor
            .upload(
                &rev_reg_def.tails_location,
                &rev_reg_def.tails_hash,
                &self.tails_server_base_url,
            )
            .await?;
        Ok(url)
    }
}

/// Keeps tails files on the local filesystem and points at them with `file://` URLs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalTailsFileService;

#[async_trait]
impl TailsFileService for LocalTailsFileService {
    async fn upload_tails_file(
        &self,
        rev_reg_def: &RevocationRegistryDefinition,
    ) -> AgentResult<Url> {
        Url::from_file_path(&rev_reg_def.tails_location).map_err(|_| {
            AgentError::from_msg(
                AgentErrorKind::InvalidArguments,
                &format!(
                    "Tails location {} is not an absolute path",
                    rev_reg_def.tails_location.display()
                ),
            )
        })
    }
}
