//! Block storage operations of the OpenStack-family backend: Cinder volumes
//! and Nova volume attachments.

use serde::Deserialize;

use crate::{
    api::{Volume, VolumeAttachment, VolumeAttachmentRequest, VolumeRequest, VolumeState},
    StratusResult,
};

use super::OpenStackProvider;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    volumes: Vec<VolumeDto>,
}

#[derive(Debug, Deserialize)]
struct VolumeResponse {
    volume: VolumeDto,
}

#[derive(Debug, Deserialize)]
struct VolumeDto {
    id: String,
    #[serde(default)]
    name: String,
    size: u32,
    #[serde(default)]
    volume_type: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct AttachmentsResponse {
    #[serde(rename = "volumeAttachments")]
    volume_attachments: Vec<AttachmentDto>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    #[serde(rename = "volumeAttachment")]
    volume_attachment: AttachmentDto,
}

#[derive(Debug, Deserialize)]
struct AttachmentDto {
    id: String,
    #[serde(rename = "serverId")]
    server_id: String,
    #[serde(rename = "volumeId")]
    volume_id: String,
    #[serde(default)]
    device: String,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Maps a Cinder volume status onto the uniform volume state.
pub(super) fn to_volume_state(status: &str) -> VolumeState {
    match status {
        "creating" => VolumeState::Creating,
        "available" => VolumeState::Available,
        "attaching" => VolumeState::Attaching,
        "detaching" => VolumeState::Detaching,
        "in-use" => VolumeState::Used,
        "deleting" => VolumeState::Deleting,
        "error" | "error_deleting" | "error_backing-up" | "error_restoring"
        | "error_extending" => VolumeState::Error,
        _ => VolumeState::Other,
    }
}

fn to_attachment(dto: AttachmentDto) -> VolumeAttachment {
    VolumeAttachment {
        id: dto.id,
        name: String::new(),
        volume_id: dto.volume_id,
        server_id: dto.server_id,
        device: dto.device,
    }
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl OpenStackProvider {
    fn to_volume(&self, dto: VolumeDto) -> Volume {
        Volume {
            id: dto.id,
            name: dto.name,
            size: dto.size,
            speed: self.config.volume_speed(&dto.volume_type),
            state: to_volume_state(&dto.status),
        }
    }

    pub(super) async fn create_volume(&self, request: VolumeRequest) -> StratusResult<Volume> {
        let mut volume_body = serde_json::json!({
            "volume": {
                "name": request.name,
                "size": request.size,
            }
        });
        // Unmapped speeds fall back to the backend's default volume type.
        if let Some(volume_type) = self.config.volume_type(request.speed) {
            volume_body["volume"]["volume_type"] = serde_json::Value::String(volume_type.into());
        }

        let response: VolumeResponse = self
            .post_json(
                format!("{}/volumes", self.endpoints.volume),
                &volume_body,
                "volume",
                &request.name,
            )
            .await?;
        Ok(self.to_volume(response.volume))
    }

    pub(super) async fn get_volume(&self, id: &str) -> StratusResult<Volume> {
        let response: VolumeResponse = self
            .get_json(
                format!("{}/volumes/{}", self.endpoints.volume, id),
                "volume",
                id,
            )
            .await?;
        Ok(self.to_volume(response.volume))
    }

    pub(super) async fn list_volumes(&self) -> StratusResult<Vec<Volume>> {
        let response: VolumesResponse = self
            .get_json(
                format!("{}/volumes/detail", self.endpoints.volume),
                "volume",
                "list",
            )
            .await?;
        Ok(
            response
                .volumes
                .into_iter()
                .map(|dto| self.to_volume(dto))
                .collect(),
        )
    }

    pub(super) async fn delete_volume(&self, id: &str) -> StratusResult<()> {
        self.delete(
            format!("{}/volumes/{}", self.endpoints.volume, id),
            "volume",
            id,
        )
        .await
    }

    pub(super) async fn create_volume_attachment(
        &self,
        request: VolumeAttachmentRequest,
    ) -> StratusResult<VolumeAttachment> {
        let body = serde_json::json!({
            "volumeAttachment": { "volumeId": request.volume_id }
        });
        let response: AttachmentResponse = self
            .post_json(
                format!(
                    "{}/servers/{}/os-volume_attachments",
                    self.endpoints.compute, request.server_id
                ),
                &body,
                "volume attachment",
                &request.volume_id,
            )
            .await?;

        let mut attachment = to_attachment(response.volume_attachment);
        attachment.name = request.name;
        Ok(attachment)
    }

    pub(super) async fn get_volume_attachment(
        &self,
        server_id: &str,
        id: &str,
    ) -> StratusResult<VolumeAttachment> {
        let response: AttachmentResponse = self
            .get_json(
                format!(
                    "{}/servers/{}/os-volume_attachments/{}",
                    self.endpoints.compute, server_id, id
                ),
                "volume attachment",
                id,
            )
            .await?;
        Ok(to_attachment(response.volume_attachment))
    }

    pub(super) async fn list_volume_attachments(
        &self,
        server_id: &str,
    ) -> StratusResult<Vec<VolumeAttachment>> {
        let response: AttachmentsResponse = self
            .get_json(
                format!(
                    "{}/servers/{}/os-volume_attachments",
                    self.endpoints.compute, server_id
                ),
                "volume attachment",
                server_id,
            )
            .await?;
        Ok(
            response
                .volume_attachments
                .into_iter()
                .map(to_attachment)
                .collect(),
        )
    }

    pub(super) async fn delete_volume_attachment(
        &self,
        server_id: &str,
        id: &str,
    ) -> StratusResult<()> {
        self.delete(
            format!(
                "{}/servers/{}/os-volume_attachments/{}",
                self.endpoints.compute, server_id, id
            ),
            "volume attachment",
            id,
        )
        .await
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_volume_state_mapping() {
        assert_eq!(to_volume_state("creating"), VolumeState::Creating);
        assert_eq!(to_volume_state("available"), VolumeState::Available);
        assert_eq!(to_volume_state("attaching"), VolumeState::Attaching);
        assert_eq!(to_volume_state("detaching"), VolumeState::Detaching);
        assert_eq!(to_volume_state("in-use"), VolumeState::Used);
        assert_eq!(to_volume_state("deleting"), VolumeState::Deleting);
        assert_eq!(to_volume_state("error_extending"), VolumeState::Error);
        assert_eq!(to_volume_state("backing-up"), VolumeState::Other);
    }

    #[test]
    fn test_attachment_decoding() -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "volumeAttachment": {
                "id": "att-1",
                "serverId": "vm-1",
                "volumeId": "vol-1",
                "device": "/dev/vdb",
            }
        });
        let response: AttachmentResponse = serde_json::from_value(payload)?;
        let attachment = to_attachment(response.volume_attachment);
        assert_eq!(attachment.server_id, "vm-1");
        assert_eq!(attachment.device, "/dev/vdb");
        Ok(())
    }
}
