//! Block storage operations of the AWS-family backend: EBS volumes and
//! attachments. Volume names live in the side-channel, the native model has
//! no name field.

use serde::Deserialize;

use crate::{
    api::{Volume, VolumeAttachment, VolumeAttachmentRequest, VolumeRequest, VolumeSpeed,
        VolumeState},
    metadata, StratusError, StratusResult,
};

use super::{
    client::{decode_ec2, ItemList, AWS_VOLUMES_CONTAINER},
    AwsProvider,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateVolumeResponse {
    #[serde(rename = "volumeId")]
    volume_id: String,
    #[serde(default)]
    size: u32,
    #[serde(rename = "volumeType", default)]
    volume_type: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct DescribeVolumesResponse {
    #[serde(rename = "volumeSet", default)]
    volumes: ItemList<VolumeItem>,
}

#[derive(Debug, Deserialize)]
struct VolumeItem {
    #[serde(rename = "volumeId")]
    volume_id: String,
    #[serde(default)]
    size: u32,
    #[serde(rename = "volumeType", default)]
    volume_type: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "attachmentSet", default)]
    attachments: ItemList<AttachmentItem>,
}

#[derive(Debug, Deserialize)]
struct AttachmentItem {
    #[serde(rename = "volumeId")]
    volume_id: String,
    #[serde(rename = "instanceId", default)]
    instance_id: String,
    #[serde(default)]
    device: String,
}

#[derive(Debug, Deserialize)]
struct AttachVolumeResponse {
    #[serde(rename = "volumeId")]
    volume_id: String,
    #[serde(rename = "instanceId")]
    instance_id: String,
    #[serde(default)]
    device: String,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The built-in EBS type of a uniform speed, used when the configuration
/// carries no mapping.
fn default_volume_type(speed: VolumeSpeed) -> &'static str {
    match speed {
        VolumeSpeed::Cold => "sc1",
        VolumeSpeed::Hdd => "st1",
        VolumeSpeed::Ssd => "gp2",
    }
}

fn default_volume_speed(volume_type: &str) -> VolumeSpeed {
    match volume_type {
        "sc1" => VolumeSpeed::Cold,
        "gp2" | "gp3" | "io1" | "io2" => VolumeSpeed::Ssd,
        _ => VolumeSpeed::Hdd,
    }
}

/// Maps an EBS volume status onto the uniform volume state.
pub(super) fn to_volume_state(status: &str) -> VolumeState {
    match status {
        "creating" => VolumeState::Creating,
        "available" => VolumeState::Available,
        "in-use" => VolumeState::Used,
        "deleting" | "deleted" => VolumeState::Deleting,
        "error" => VolumeState::Error,
        _ => VolumeState::Other,
    }
}

fn to_attachment(item: AttachmentItem) -> VolumeAttachment {
    VolumeAttachment {
        id: item.volume_id.clone(),
        name: String::new(),
        volume_id: item.volume_id,
        server_id: item.instance_id,
        device: item.device,
    }
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AwsProvider {
    fn volume_type_for(&self, speed: VolumeSpeed) -> String {
        self.config
            .volume_type(speed)
            .map(str::to_string)
            .unwrap_or_else(|| default_volume_type(speed).to_string())
    }

    fn volume_speed_for(&self, volume_type: &str) -> VolumeSpeed {
        if self.config.volume_speeds.contains_key(volume_type) {
            self.config.volume_speed(volume_type)
        } else {
            default_volume_speed(volume_type)
        }
    }

    pub(super) async fn create_volume(&self, request: VolumeRequest) -> StratusResult<Volume> {
        let params = vec![
            ("Size".to_string(), request.size.to_string()),
            (
                "VolumeType".to_string(),
                self.volume_type_for(request.speed),
            ),
            (
                "AvailabilityZone".to_string(),
                format!("{}a", self.auth.region),
            ),
        ];
        let xml = self
            .ec2_call("CreateVolume", params, "volume", &request.name)
            .await?;
        let created: CreateVolumeResponse = decode_ec2(&xml)?;

        if let Err(err) =
            metadata::save_text_record(self, AWS_VOLUMES_CONTAINER, &created.volume_id, &request.name)
                .await
        {
            if let Err(cleanup) = self.delete_volume(&created.volume_id).await {
                tracing::warn!("volume cleanup failed after record error: {}", cleanup);
            }
            return Err(err);
        }

        Ok(Volume {
            id: created.volume_id,
            name: request.name,
            size: created.size,
            speed: self.volume_speed_for(&created.volume_type),
            state: to_volume_state(&created.status),
        })
    }

    pub(super) async fn get_volume(&self, id: &str) -> StratusResult<Volume> {
        let params = vec![("VolumeId.1".to_string(), id.to_string())];
        let xml = self
            .ec2_call("DescribeVolumes", params, "volume", id)
            .await?;
        let response: DescribeVolumesResponse = decode_ec2(&xml)?;
        let item = response
            .volumes
            .items
            .into_iter()
            .next()
            .ok_or_else(|| StratusError::not_found("volume", id))?;

        let name = metadata::load_text_record(self, AWS_VOLUMES_CONTAINER, id)
            .await
            .unwrap_or_default();
        Ok(Volume {
            id: item.volume_id,
            name,
            size: item.size,
            speed: self.volume_speed_for(&item.volume_type),
            state: to_volume_state(&item.status),
        })
    }

    pub(super) async fn list_volumes(&self) -> StratusResult<Vec<Volume>> {
        let xml = self
            .ec2_call("DescribeVolumes", Vec::new(), "volume", "list")
            .await?;
        let response: DescribeVolumesResponse = decode_ec2(&xml)?;

        let mut volumes = Vec::new();
        for item in response.volumes.items {
            let name = metadata::load_text_record(self, AWS_VOLUMES_CONTAINER, &item.volume_id)
                .await
                .unwrap_or_default();
            volumes.push(Volume {
                id: item.volume_id,
                name,
                size: item.size,
                speed: self.volume_speed_for(&item.volume_type),
                state: to_volume_state(&item.status),
            });
        }
        Ok(volumes)
    }

    pub(super) async fn delete_volume(&self, id: &str) -> StratusResult<()> {
        if let Err(err) = metadata::remove_record(self, AWS_VOLUMES_CONTAINER, id).await {
            if !err.is_not_found() {
                tracing::warn!("error removing volume record {}: {}", id, err);
            }
        }
        let params = vec![("VolumeId".to_string(), id.to_string())];
        self.ec2_call("DeleteVolume", params, "volume", id).await?;
        Ok(())
    }

    pub(super) async fn create_volume_attachment(
        &self,
        request: VolumeAttachmentRequest,
    ) -> StratusResult<VolumeAttachment> {
        // EC2 requires the caller to pick the device slot.
        let taken = self.list_volume_attachments(&request.server_id).await?.len();
        let device = format!("/dev/sd{}", (b'f' + taken as u8) as char);

        let params = vec![
            ("InstanceId".to_string(), request.server_id.clone()),
            ("VolumeId".to_string(), request.volume_id.clone()),
            ("Device".to_string(), device),
        ];
        let xml = self
            .ec2_call(
                "AttachVolume",
                params,
                "volume attachment",
                &request.volume_id,
            )
            .await?;
        let attached: AttachVolumeResponse = decode_ec2(&xml)?;

        Ok(VolumeAttachment {
            id: attached.volume_id.clone(),
            name: request.name,
            volume_id: attached.volume_id,
            server_id: attached.instance_id,
            device: attached.device,
        })
    }

    pub(super) async fn get_volume_attachment(
        &self,
        server_id: &str,
        id: &str,
    ) -> StratusResult<VolumeAttachment> {
        let params = vec![("VolumeId.1".to_string(), id.to_string())];
        let xml = self
            .ec2_call("DescribeVolumes", params, "volume attachment", id)
            .await?;
        let response: DescribeVolumesResponse = decode_ec2(&xml)?;
        response
            .volumes
            .items
            .into_iter()
            .flat_map(|volume| volume.attachments.items)
            .find(|attachment| attachment.instance_id == server_id)
            .map(to_attachment)
            .ok_or_else(|| StratusError::not_found("volume attachment", id))
    }

    pub(super) async fn list_volume_attachments(
        &self,
        server_id: &str,
    ) -> StratusResult<Vec<VolumeAttachment>> {
        let params = vec![
            ("Filter.1.Name".to_string(), "attachment.instance-id".to_string()),
            ("Filter.1.Value.1".to_string(), server_id.to_string()),
        ];
        let xml = self
            .ec2_call("DescribeVolumes", params, "volume attachment", server_id)
            .await?;
        let response: DescribeVolumesResponse = decode_ec2(&xml)?;
        Ok(
            response
                .volumes
                .items
                .into_iter()
                .flat_map(|volume| volume.attachments.items)
                .map(to_attachment)
                .collect(),
        )
    }

    pub(super) async fn delete_volume_attachment(
        &self,
        server_id: &str,
        id: &str,
    ) -> StratusResult<()> {
        let params = vec![
            ("InstanceId".to_string(), server_id.to_string()),
            ("VolumeId".to_string(), id.to_string()),
        ];
        self.ec2_call("DetachVolume", params, "volume attachment", id)
            .await?;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_type_round_trip() {
        assert_eq!(default_volume_type(VolumeSpeed::Cold), "sc1");
        assert_eq!(default_volume_type(VolumeSpeed::Hdd), "st1");
        assert_eq!(default_volume_type(VolumeSpeed::Ssd), "gp2");
        assert_eq!(default_volume_speed("sc1"), VolumeSpeed::Cold);
        assert_eq!(default_volume_speed("gp3"), VolumeSpeed::Ssd);
        assert_eq!(default_volume_speed("st1"), VolumeSpeed::Hdd);
    }

    #[test]
    fn test_volume_state_mapping() {
        assert_eq!(to_volume_state("creating"), VolumeState::Creating);
        assert_eq!(to_volume_state("available"), VolumeState::Available);
        assert_eq!(to_volume_state("in-use"), VolumeState::Used);
        assert_eq!(to_volume_state("deleting"), VolumeState::Deleting);
        assert_eq!(to_volume_state("deleted"), VolumeState::Deleting);
        assert_eq!(to_volume_state("error"), VolumeState::Error);
        assert_eq!(to_volume_state("odd"), VolumeState::Other);
    }

    #[test]
    fn test_describe_volumes_decoding() -> anyhow::Result<()> {
        let xml = r#"<DescribeVolumesResponse>
  <volumeSet>
    <item>
      <volumeId>vol-1</volumeId>
      <size>500</size>
      <volumeType>st1</volumeType>
      <status>in-use</status>
      <attachmentSet>
        <item>
          <volumeId>vol-1</volumeId>
          <instanceId>i-1</instanceId>
          <device>/dev/sdf</device>
        </item>
      </attachmentSet>
    </item>
  </volumeSet>
</DescribeVolumesResponse>"#;
        let response: DescribeVolumesResponse = decode_ec2(xml)?;
        let volume = &response.volumes.items[0];
        assert_eq!(volume.size, 500);
        assert_eq!(volume.attachments.items[0].device, "/dev/sdf");
        Ok(())
    }
}
