// src/services/attachment_service.rs

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{common::error::AppError, models::request::AttachmentKind};

/// Destino dos bytes dos anexos. Quem chama trata a falha como melhor esforço.
#[async_trait]
pub trait AttachmentSink: Send + Sync {
    async fn write_attachment(
        &self,
        tenant_id: Uuid,
        attachment_id: Uuid,
        kind: AttachmentKind,
        bytes: Vec<u8>,
    ) -> Result<PathBuf, AppError>;
}

// Grava em disco: {raiz}/{tenant}/{tipo}/{id_do_anexo}
#[derive(Debug, Clone)]
pub struct LocalAttachmentSink {
    root: PathBuf,
}

impl LocalAttachmentSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, tenant_id: Uuid, attachment_id: Uuid, kind: AttachmentKind) -> PathBuf {
        self.root
            .join(tenant_id.to_string())
            .join(kind.as_str())
            .join(attachment_id.to_string())
    }
}

#[async_trait]
impl AttachmentSink for LocalAttachmentSink {
    async fn write_attachment(
        &self,
        tenant_id: Uuid,
        attachment_id: Uuid,
        kind: AttachmentKind,
        bytes: Vec<u8>,
    ) -> Result<PathBuf, AppError> {
        let path = self.path_for(tenant_id, attachment_id, kind);

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| anyhow::anyhow!("criando {}: {}", dir.display(), e))?;
        }

        // Grava num temporário e renomeia: nunca fica um arquivo pela metade
        let partial = path.with_extension("part");
        tokio::fs::write(&partial, &bytes)
            .await
            .map_err(|e| anyhow::anyhow!("gravando {}: {}", partial.display(), e))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| anyhow::anyhow!("renomeando {}: {}", path.display(), e))?;

        tracing::debug!(%tenant_id, %attachment_id, kind = kind.as_str(), size = bytes.len(), "anexo gravado");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_under_tenant_and_kind() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalAttachmentSink::new(dir.path());
        let tenant = Uuid::new_v4();
        let id = Uuid::new_v4();

        let path = sink
            .write_attachment(tenant, id, AttachmentKind::Invoice, b"%PDF-1.4".to_vec())
            .await
            .unwrap();

        assert!(path.starts_with(dir.path().join(tenant.to_string()).join("invoice")));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-1.4");
        assert!(!path.with_extension("part").exists());
    }

    #[tokio::test]
    async fn unwritable_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // Um arquivo no lugar do diretório raiz impede o create_dir_all
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let sink = LocalAttachmentSink::new(&blocker);

        let result = sink
            .write_attachment(Uuid::new_v4(), Uuid::new_v4(), AttachmentKind::Budget, vec![1, 2, 3])
            .await;
        assert!(matches!(result, Err(AppError::InternalServerError(_))));
    }
}
