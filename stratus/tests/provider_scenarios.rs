//! End-to-end scenarios exercised against the in-process backend: the
//! gatewayed-network lifecycle, SSH descriptors, sized template selection,
//! image search, bounded convergence, volume attachments, object expiry and
//! ranged reads.

use std::time::Duration;

use stratus::{
    api::{
        ByteRange, NetworkRequest, Object, Provider, SizingRequirements, VmRequest, VmSize,
        VmState, VmTemplate, VolumeAttachmentRequest, VolumeRequest, VolumeSpeed, VolumeState,
    },
    providers::MemoryProvider,
    service::Service,
};

fn gateway_request(name: &str) -> VmRequest {
    VmRequest::builder()
        .name(name)
        .template_id("tpl-small")
        .image_id("img-ubuntu-1804")
        .build()
}

async fn create_lab_network(
    service: &Service<MemoryProvider>,
    name: &str,
    cidr: &str,
) -> anyhow::Result<stratus::api::Network> {
    let network = service
        .create_network(
            NetworkRequest::builder()
                .name(name)
                .cidr(cidr)
                .gateway(gateway_request(&format!("gw-{}", name)))
                .build(),
        )
        .await?;
    Ok(network)
}

#[tokio::test]
async fn test_create_and_delete_gatewayed_network() -> anyhow::Result<()> {
    let service = Service::new(MemoryProvider::new());

    let network = create_lab_network(&service, "lab", "192.168.1.0/24").await?;
    assert_eq!(network.cidr, "192.168.1.0/24");
    assert!(!network.gateway_id.is_empty());

    // Exactly one network with that id is visible, and exactly one VM whose
    // id is the gateway id.
    let networks = service.list_networks().await?;
    assert_eq!(networks.len(), 1);
    assert_eq!(networks[0].id, network.id);
    assert_eq!(networks[0].gateway_id, network.gateway_id);

    let fetched = service.get_network(&network.id).await?;
    assert_eq!(fetched.cidr, network.cidr);

    let vms = service.list_vms().await?;
    assert_eq!(vms.len(), 1);
    assert_eq!(vms[0].id, network.gateway_id);

    // The gateway is started, publicly reachable, and itself gateway-less.
    let gateway = service.get_vm(&network.gateway_id).await?;
    assert_eq!(gateway.state, VmState::Started);
    assert!(gateway.gateway_id.is_empty());
    assert!(gateway.access_ip().is_some());

    service.delete_network(&network.id).await?;
    assert!(service.list_networks().await?.is_empty());
    assert!(service.list_vms().await?.is_empty());
    assert!(service
        .get_network(&network.id)
        .await
        .unwrap_err()
        .is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_gateway_ssh_descriptor() -> anyhow::Result<()> {
    let service = Service::new(MemoryProvider::new());
    let network = create_lab_network(&service, "lab", "192.168.2.0/24").await?;

    let ssh = service.get_ssh_config(&network.gateway_id).await?;
    assert!(!ssh.host.is_empty());
    assert!(!ssh.private_key.is_empty());
    assert_eq!(ssh.user, "gpac");
    assert_eq!(ssh.port, 22);
    assert_eq!(ssh.connection_timeout, Duration::from_secs(30));
    assert!(ssh.gateway.is_none());

    // A private sibling tunnels through the gateway.
    let worker = service
        .create_vm(
            VmRequest::builder()
                .name("worker-0")
                .network_ids(vec![network.id.clone()])
                .template_id("tpl-small")
                .image_id("img-ubuntu-1804")
                .build(),
        )
        .await?;
    let ssh = service.get_ssh_config(&worker.id).await?;
    let hop = ssh.gateway.expect("private vm routes through its gateway");
    assert_eq!(hop.user, "gpac");
    assert!(!hop.host.is_empty());

    service.delete_vm(&worker.id).await?;
    service.delete_network(&network.id).await?;
    Ok(())
}

#[tokio::test]
async fn test_template_selection_by_size() -> anyhow::Result<()> {
    fn template(id: &str, cores: u32, ram: f32, disk: u32) -> VmTemplate {
        VmTemplate {
            id: id.into(),
            name: id.into(),
            size: VmSize {
                cores,
                ram_size: ram,
                disk_size: disk,
            },
        }
    }

    let provider = MemoryProvider::with_catalog(
        Default::default(),
        MemoryProvider::default_images(),
        vec![
            template("a", 1, 1.0, 10),
            template("b", 2, 4.0, 20),
            template("c", 4, 8.0, 40),
        ],
    );
    let service = Service::new(provider);

    let selected = service
        .select_templates_by_size(SizingRequirements {
            min_cores: 1,
            min_ram_size: 4.0,
            min_disk_size: 10,
        })
        .await?;
    let ids: Vec<&str> = selected.iter().map(|tpl| tpl.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);
    Ok(())
}

#[tokio::test]
async fn test_image_search() -> anyhow::Result<()> {
    let service = Service::new(MemoryProvider::new());

    let image = service.search_image("Ubuntu 16.04").await?;
    assert_eq!(image.name, "Ubuntu 16.04");

    assert!(service.search_image("zzz").await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_convergence_and_timeout() -> anyhow::Result<()> {
    let service = Service::new(MemoryProvider::new());
    let network = create_lab_network(&service, "lab", "10.3.0.0/24").await?;

    let vm_id = network.gateway_id.clone();
    service.stop_vm(&vm_id).await?;
    let stopped = service
        .wait_vm_state(&vm_id, VmState::Stopped, Duration::from_secs(40))
        .await?;
    assert_eq!(stopped.state, VmState::Stopped);

    // A zero deadline loses the race before any probe can match.
    let err = service
        .wait_vm_state(&vm_id, VmState::Stopped, Duration::from_secs(0))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    service.start_vm(&vm_id).await?;
    let started = service
        .wait_vm_state(&vm_id, VmState::Started, Duration::from_secs(40))
        .await?;
    assert_eq!(started.state, VmState::Started);

    service.delete_network(&network.id).await?;
    Ok(())
}

#[tokio::test]
async fn test_volume_attach_detach() -> anyhow::Result<()> {
    let service = Service::new(MemoryProvider::new());
    let network = create_lab_network(&service, "lab", "10.4.0.0/24").await?;
    let vm_id = network.gateway_id.clone();

    let mut volume_ids = Vec::new();
    for name in ["data-0", "data-1"] {
        let volume = service
            .create_volume(
                VolumeRequest::builder()
                    .name(name)
                    .size(500)
                    .speed(VolumeSpeed::Hdd)
                    .build(),
            )
            .await?;
        let volume = service
            .wait_volume_state(&volume.id, VolumeState::Available, Duration::from_secs(40))
            .await?;
        assert_eq!(volume.size, 500);
        assert_eq!(volume.speed, VolumeSpeed::Hdd);
        volume_ids.push(volume.id);
    }

    for volume_id in &volume_ids {
        let attachment = service
            .create_volume_attachment(
                VolumeAttachmentRequest::builder()
                    .volume_id(volume_id.clone())
                    .server_id(vm_id.clone())
                    .build(),
            )
            .await?;
        assert!(!attachment.device.is_empty());
    }

    let attachments = service.list_volume_attachments(&vm_id).await?;
    assert_eq!(attachments.len(), 2);

    let fetched = service
        .get_volume_attachment(&vm_id, &volume_ids[0])
        .await?;
    assert!(!fetched.device.is_empty());

    for volume_id in &volume_ids {
        service.delete_volume_attachment(&vm_id, volume_id).await?;
        assert!(service
            .get_volume_attachment(&vm_id, volume_id)
            .await
            .unwrap_err()
            .is_not_found());
        service
            .wait_volume_state(volume_id, VolumeState::Available, Duration::from_secs(40))
            .await?;
        service.delete_volume(volume_id).await?;
    }

    service.delete_network(&network.id).await?;
    Ok(())
}

#[tokio::test]
async fn test_object_expiry() -> anyhow::Result<()> {
    let provider = MemoryProvider::new();
    provider.create_container("bucket").await?;

    let mut object = Object::with_content("ephemeral", "short-lived");
    object.delete_at = Some(chrono::Utc::now() + chrono::Duration::milliseconds(500));
    provider.put_object("bucket", object).await?;

    // Before the expiry the content is served.
    let fetched = provider.get_object("bucket", "ephemeral", &[]).await?;
    assert_eq!(&fetched.content[..], b"short-lived");

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(provider
        .get_object("bucket", "ephemeral", &[])
        .await
        .unwrap_err()
        .is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_ranged_object_read() -> anyhow::Result<()> {
    let provider = MemoryProvider::new();
    provider.create_container("bucket").await?;
    provider
        .put_object("bucket", Object::with_content("digits", "123456789"))
        .await?;

    let ranges = [ByteRange::new(0, 2), ByteRange::new(4, 7)];
    let fetched = provider.get_object("bucket", "digits", &ranges).await?;
    assert_eq!(&fetched.content[..], b"1235678");
    assert_eq!(fetched.content_length, 7);
    Ok(())
}

#[tokio::test]
async fn test_object_round_trip_and_copy() -> anyhow::Result<()> {
    let provider = MemoryProvider::new();
    provider.create_container("bucket").await?;

    let mut object = Object::with_content("source", "payload");
    object.metadata.insert("tier".into(), "gold".into());
    provider.put_object("bucket", object).await?;

    let fetched = provider.get_object("bucket", "source", &[]).await?;
    assert_eq!(&fetched.content[..], b"payload");
    assert_eq!(fetched.metadata.get("tier").map(String::as_str), Some("gold"));

    provider.copy_object("bucket", "source", "copy").await?;
    let copy = provider.get_object("bucket", "copy", &[]).await?;
    assert_eq!(&copy.content[..], b"payload");

    let names = provider
        .list_objects("bucket", Default::default())
        .await?;
    assert_eq!(names, vec!["copy".to_string(), "source".to_string()]);

    provider.delete_object("bucket", "source").await?;
    assert!(provider
        .get_object("bucket", "source", &[])
        .await
        .unwrap_err()
        .is_not_found());
    Ok(())
}
