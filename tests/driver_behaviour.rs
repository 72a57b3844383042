//! Behavioural tests for the StratusLab driver against a scripted backend.

#[path = "common/driver_fixtures.rs"]
mod driver_fixtures;

use rstest::{fixture, rstest};
use stratuslab_libcloud::backend::{Attributes, USER_PUBLIC_KEY_FILE, VM_NAME};
use stratuslab_libcloud::test_support::{
    BackendCall, FakeOperation, StaticCatalogFetcher, marketplace_document,
};
use stratuslab_libcloud::{
    Attachment, DriverError, Image, MarketplaceError, Node, NodeAuthSshKey, NodeDriver,
    NodeRequest, NodeState, RecordError, Resources, Size, StorageVolume, Visibility, VmInfo,
    VolumeInfo,
};

use driver_fixtures::{TWO_SITES, TestDriver, driver_with, location, two_site_driver};

#[fixture]
fn driver() -> TestDriver {
    two_site_driver()
}

fn running_vm(id: &str, host: Option<&str>) -> VmInfo {
    VmInfo {
        name: Some(format!("vm-{id}")),
        state_summary: Some(String::from("running")),
        host: host.map(str::to_owned),
        ..VmInfo::new(id)
    }
}

fn attributes(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

fn small() -> Size {
    Size::with_resources("m1.small", Resources::new(2, 1024, 2048))
}

fn image() -> Image {
    Image::new("GJ5vp6hJV7ZEn3GfIfkCb8Wq_Gy", "ttylinux-9.7")
}

#[rstest]
fn metadata_describes_the_provider(driver: TestDriver) {
    assert_eq!(driver.name(), "StratusLab Node Provider");
    assert_eq!(driver.website(), "http://stratuslab.eu/");
    assert_eq!(driver.provider_type(), "stratuslab");
    assert_eq!(driver.create_node_features(), ["ssh_key"]);
}

#[rstest]
fn locations_exclude_the_default_section(driver: TestDriver) {
    let locations = driver
        .list_locations()
        .unwrap_or_else(|err| panic!("locations: {err}"));
    let ids: Vec<&str> = locations.iter().map(|loc| loc.id.as_str()).collect();
    assert_eq!(ids, ["siteA", "siteB"]);
    assert_eq!(driver.default_location().name, "Site A");
}

#[rstest]
fn sizes_merge_defaults_with_user_types(driver: TestDriver) {
    let sizes = driver
        .list_sizes(None)
        .unwrap_or_else(|err| panic!("sizes: {err}"));
    let find = |name: &str| sizes.iter().find(|size| size.name == name).cloned();

    assert_eq!(find("m1.small").map(|size| size.cpu), Some(2));
    assert_eq!(
        find("m2.custom").map(|size| size.resources()),
        Some(Resources::new(8, 16384, 4096))
    );
    assert_eq!(
        find("t1.micro").map(|size| size.resources()),
        Some(Resources::new(1, 128, 512))
    );
    assert_eq!(sizes.len(), 7);
}

#[rstest]
fn list_nodes_queries_every_location(driver: TestDriver) {
    driver.backend().push_vm("siteA", &running_vm("1", None));
    driver.backend().push_vm("siteB", &running_vm("2", None));
    driver.backend().push_vm("siteB", &running_vm("3", None));

    let nodes = driver
        .list_nodes()
        .unwrap_or_else(|err| panic!("nodes: {err}"));

    let placed: Vec<(&str, &str)> = nodes
        .iter()
        .map(|node| (node.id.as_str(), node.location.id.as_str()))
        .collect();
    assert_eq!(placed, [("1", "siteA"), ("2", "siteB"), ("3", "siteB")]);
    assert!(
        nodes
            .iter()
            .all(|node| node.last_known_state() == NodeState::Running)
    );
}

#[rstest]
fn listing_nodes_surfaces_backend_failures(driver: TestDriver) {
    driver.backend().fail(FakeOperation::Monitor);
    let err = driver.list_nodes().expect_err("monitor fails");
    assert!(matches!(err, DriverError::Backend(_)));
}

#[rstest]
fn malformed_instance_records_are_rejected(driver: TestDriver) {
    driver.backend().push_vm_attributes(
        "siteB",
        attributes(&[("id", "5"), ("template_cpu", "two")]),
    );

    let err = driver.list_nodes().expect_err("cpu is not numeric");

    assert!(matches!(
        err,
        DriverError::Record(RecordError::InvalidAttribute {
            attribute: "template_cpu",
            ref value,
            ..
        }) if value == "two"
    ));
}

#[rstest]
fn node_state_rejects_malformed_records(driver: TestDriver) {
    driver.backend().push_vm_attributes(
        "siteA",
        attributes(&[("id", "6"), ("template_memory", "lots")]),
    );
    let node = Node::builder("6", "vm-6")
        .location(location(&driver, "siteA"))
        .build()
        .unwrap_or_else(|err| panic!("node: {err}"));

    let err = driver.node_state(&node).expect_err("memory is not numeric");

    assert!(matches!(err, DriverError::Record(_)));
}

#[rstest]
fn create_node_without_key_stages_no_file(driver: TestDriver) {
    driver.backend().push_launch(&["101"]);
    driver.backend().set_address("101", "134.158.75.101");
    let size = small();
    let image = image();

    let node = driver
        .create_node(NodeRequest::new("worker", &size, &image))
        .unwrap_or_else(|err| panic!("create node: {err}"));

    assert_eq!(node.id, "101");
    assert_eq!(node.name, "worker");
    assert_eq!(node.last_known_state(), NodeState::Pending);
    assert_eq!(node.public_ips, ["134.158.75.101"]);
    assert_eq!(node.location.id, "siteA");
    assert_eq!(node.size, size);
    assert_eq!(node.image, image);
    assert!(driver.backend().key_files().is_empty());

    let configs = driver.backend().runner_configs();
    assert_eq!(configs.len(), 1);
    assert!(configs.iter().all(|config| !config.is_set(USER_PUBLIC_KEY_FILE)));
    assert!(
        configs
            .iter()
            .all(|config| config.get(VM_NAME) == Some("worker"))
    );
}

#[rstest]
fn create_node_keeps_key_file_only_while_launching(driver: TestDriver) {
    driver.backend().push_launch(&["102"]);
    let key = NodeAuthSshKey::new("ssh-ed25519 AAAAC3Nza user@example");
    let size = small();
    let image = image();

    driver
        .create_node(NodeRequest::new("worker", &size, &image).auth(&key))
        .unwrap_or_else(|err| panic!("create node: {err}"));

    let observed = driver.backend().key_files();
    assert_eq!(observed.len(), 1);
    let seen = observed
        .first()
        .unwrap_or_else(|| panic!("key file observed"));
    assert_eq!(seen.contents.as_deref(), Some(key.pubkey()));
    assert!(!std::path::Path::new(&seen.path).exists());
}

#[rstest]
fn create_node_removes_key_file_when_launch_fails(driver: TestDriver) {
    driver.backend().fail(FakeOperation::RunInstance);
    let key = NodeAuthSshKey::new("ssh-rsa AAAAB3Nza user@example");
    let size = small();
    let image = image();

    let err = driver
        .create_node(NodeRequest::new("worker", &size, &image).auth(&key))
        .expect_err("launch fails");

    assert!(matches!(err, DriverError::Backend(_)));
    let observed = driver.backend().key_files();
    let seen = observed
        .first()
        .unwrap_or_else(|| panic!("key file observed"));
    assert!(seen.contents.is_some());
    assert!(!std::path::Path::new(&seen.path).exists());
}

#[rstest]
fn create_node_removes_key_file_when_runner_cannot_be_built(driver: TestDriver) {
    driver.backend().fail(FakeOperation::Runner);
    let key = NodeAuthSshKey::new("ssh-rsa AAAAB3Nza user@example");
    let size = small();
    let image = image();

    driver
        .create_node(NodeRequest::new("worker", &size, &image).auth(&key))
        .expect_err("runner fails");

    let configs = driver.backend().runner_configs();
    let path = configs
        .first()
        .and_then(|config| config.get(USER_PUBLIC_KEY_FILE))
        .map(str::to_owned)
        .unwrap_or_else(|| panic!("key file configured"));
    assert!(!std::path::Path::new(&path).exists());
}

#[rstest]
fn create_node_without_address_still_returns_node(driver: TestDriver) {
    driver.backend().push_launch(&["103"]);
    driver.backend().fail(FakeOperation::NetworkDetail);
    let size = small();
    let image = image();
    let site_b = location(&driver, "siteB");

    let node = driver
        .create_node(NodeRequest::new("worker", &size, &image).location(&site_b))
        .unwrap_or_else(|err| panic!("create node: {err}"));

    assert!(node.public_ips.is_empty());
    assert_eq!(node.location, site_b);
}

#[rstest]
fn create_node_requires_an_instance_id(driver: TestDriver) {
    driver.backend().push_launch(&[]);
    let size = small();
    let image = image();

    let err = driver
        .create_node(NodeRequest::new("worker", &size, &image))
        .expect_err("no ids returned");

    assert!(matches!(err, DriverError::NoInstanceIds { ref name } if name == "worker"));
}

#[rstest]
fn create_node_uses_first_instance_id(driver: TestDriver) {
    driver.backend().push_launch(&["201", "202"]);
    let size = small();
    let image = image();

    let node = driver
        .create_node(NodeRequest::new("pair", &size, &image))
        .unwrap_or_else(|err| panic!("create node: {err}"));

    assert_eq!(node.id, "201");
}

#[rstest]
fn destroy_node_kills_instance_and_records_termination(driver: TestDriver) {
    let mut node = Node::builder("55", "worker")
        .state(NodeState::Running)
        .size(small())
        .image(image())
        .location(location(&driver, "siteB"))
        .build()
        .unwrap_or_else(|err| panic!("node: {err}"));

    let destroyed = driver
        .destroy_node(&mut node)
        .unwrap_or_else(|err| panic!("destroy: {err}"));

    assert!(destroyed);
    assert_eq!(node.last_known_state(), NodeState::Terminated);
    assert!(driver.backend().calls().contains(&BackendCall::KillInstances {
        ids: vec![String::from("55")],
    }));
}

#[rstest]
fn node_state_is_read_from_the_backend(driver: TestDriver) {
    driver.backend().push_vm("siteA", &running_vm("9", Some("onehost-1")));
    let mut node = Node::builder("9", "vm-9")
        .location(location(&driver, "siteA"))
        .build()
        .unwrap_or_else(|err| panic!("node: {err}"));
    node.set_last_known_state(NodeState::Terminated);

    let state = driver
        .node_state(&node)
        .unwrap_or_else(|err| panic!("state: {err}"));
    let host = driver
        .node_host(&node)
        .unwrap_or_else(|err| panic!("host: {err}"));

    assert_eq!(state, NodeState::Running);
    assert_eq!(node.last_known_state(), NodeState::Terminated);
    assert_eq!(host.as_deref(), Some("onehost-1"));
}

#[rstest]
fn unknown_nodes_cannot_be_queried(driver: TestDriver) {
    let node = Node::builder("404", "ghost")
        .location(location(&driver, "siteA"))
        .build()
        .unwrap_or_else(|err| panic!("node: {err}"));

    let err = driver.node_state(&node).expect_err("node is unknown");

    assert_eq!(err.to_string(), "cannot recover state information for 404");
}

#[rstest]
fn images_come_from_the_location_marketplace() {
    let fetcher = StaticCatalogFetcher::new(marketplace_document(&[
        (Some("ID1"), Some("CentOS 6.2"), None),
        (Some("ID2"), None, Some("  Debian testing image")),
    ]));
    let driver = driver_with(TWO_SITES, fetcher);
    let site_b = location(&driver, "siteB");

    let images = driver
        .list_images(Some(&site_b))
        .unwrap_or_else(|err| panic!("images: {err}"));

    assert_eq!(
        images,
        [
            Image::new("ID1", "CentOS 6.2"),
            Image::new("ID2", "Debian testing image"),
        ]
    );
}

#[test]
fn marketplace_outage_degrades_to_no_images() {
    let driver = driver_with(TWO_SITES, StaticCatalogFetcher::unavailable());

    let images = driver
        .list_images(None)
        .unwrap_or_else(|err| panic!("images: {err}"));
    let err = driver.try_list_images(None).expect_err("outage is reported");

    assert!(images.is_empty());
    assert!(matches!(
        err,
        DriverError::Marketplace(MarketplaceError::Fetch { ref url, .. })
            if url == "https://mp.example.org/metadata"
    ));
}

#[rstest]
fn volumes_are_listed_with_their_location(driver: TestDriver) {
    driver.backend().push_volume(&VolumeInfo {
        uuid: String::from("vol-1"),
        tag: String::from("data"),
        size: 5,
    });

    let volumes = driver
        .list_volumes(None)
        .unwrap_or_else(|err| panic!("volumes: {err}"));

    assert_eq!(
        volumes,
        [StorageVolume::new("vol-1", "data", 5, location(&driver, "siteA"))]
    );
    assert!(driver.backend().calls().contains(&BackendCall::DescribeVolumes {
        filters: std::collections::BTreeMap::new(),
    }));
}

#[rstest]
fn volume_records_without_size_are_rejected(driver: TestDriver) {
    driver
        .backend()
        .push_volume_attributes(attributes(&[("uuid", "vol-4"), ("tag", "data")]));

    let err = driver.list_volumes(None).expect_err("size is required");

    assert!(matches!(
        err,
        DriverError::Record(RecordError::MissingAttribute {
            record: "volume",
            attribute: "size",
        })
    ));
    assert_eq!(err.to_string(), "volume record is missing attribute 'size'");
}

#[rstest]
fn created_volumes_are_private(driver: TestDriver) {
    driver.backend().push_created_volume_id("vol-new");

    let volume = driver
        .create_volume(10, "scratch", None, Some("ignored-snapshot"))
        .unwrap_or_else(|err| panic!("create volume: {err}"));

    assert_eq!(volume.id, "vol-new");
    assert_eq!(volume.name, "scratch");
    assert_eq!(volume.size, 10);
    assert_eq!(volume.location.id, "siteA");
    assert_eq!(volume.attachment(), &Attachment::Detached);
    assert!(driver.backend().calls().contains(&BackendCall::CreateVolume {
        size: 10,
        tag: String::from("scratch"),
        visibility: Visibility::Private,
    }));
}

#[rstest]
fn destroy_volume_deletes_by_id(driver: TestDriver) {
    let volume = StorageVolume::new("vol-9", "old", 1, location(&driver, "siteB"));

    let destroyed = driver
        .destroy_volume(&volume)
        .unwrap_or_else(|err| panic!("destroy volume: {err}"));

    assert!(destroyed);
    assert!(driver.backend().calls().contains(&BackendCall::PersistentDisk {
        section: Some(String::from("siteB")),
    }));
    assert!(driver.backend().calls().contains(&BackendCall::DeleteVolume {
        volume_id: String::from("vol-9"),
    }));
}

#[rstest]
fn attach_then_detach_clears_the_attachment(driver: TestDriver) {
    driver.backend().push_vm("siteA", &running_vm("77", Some("onehost-7")));
    let site_a = location(&driver, "siteA");
    let node = Node::builder("77", "vm-77")
        .location(site_a.clone())
        .build()
        .unwrap_or_else(|err| panic!("node: {err}"));
    let mut volume = StorageVolume::new("vol-1", "data", 5, site_a);

    driver
        .attach_volume(&node, &mut volume, Some("/dev/vdb"))
        .unwrap_or_else(|err| panic!("attach: {err}"));
    assert_eq!(
        volume.attached_node().map(|attached| attached.id.as_str()),
        Some("77")
    );

    driver
        .detach_volume(&mut volume)
        .unwrap_or_else(|err| panic!("detach: {err}"));
    assert!(!volume.is_attached());

    let err = driver
        .detach_volume(&mut volume)
        .expect_err("second detach fails");
    assert!(matches!(err, DriverError::NotAttached { .. }));
    assert_eq!(err.to_string(), "volume vol-1 is not attached to a node");

    let calls = driver.backend().calls();
    assert!(calls.contains(&BackendCall::HotAttach {
        host: String::from("onehost-7"),
        node_id: String::from("77"),
        volume_id: String::from("vol-1"),
    }));
    assert!(calls.contains(&BackendCall::HotDetach {
        node_id: String::from("77"),
        volume_id: String::from("vol-1"),
    }));
}

#[rstest]
fn attach_requires_host_information(driver: TestDriver) {
    driver.backend().push_vm("siteA", &running_vm("78", None));
    let site_a = location(&driver, "siteA");
    let node = Node::builder("78", "vm-78")
        .location(site_a.clone())
        .build()
        .unwrap_or_else(|err| panic!("node: {err}"));
    let mut volume = StorageVolume::new("vol-2", "data", 5, site_a);

    let err = driver
        .attach_volume(&node, &mut volume, None)
        .expect_err("host is missing");

    assert!(matches!(err, DriverError::MissingHost { ref node_id } if node_id == "78"));
    assert!(!volume.is_attached());
}

#[rstest]
fn failed_hot_attach_leaves_volume_detached(driver: TestDriver) {
    driver.backend().push_vm("siteA", &running_vm("79", Some("onehost-9")));
    driver.backend().fail(FakeOperation::HotAttach);
    let site_a = location(&driver, "siteA");
    let node = Node::builder("79", "vm-79")
        .location(site_a.clone())
        .build()
        .unwrap_or_else(|err| panic!("node: {err}"));
    let mut volume = StorageVolume::new("vol-3", "data", 5, site_a);

    driver
        .attach_volume(&node, &mut volume, None)
        .expect_err("hot attach fails");

    assert!(!volume.is_attached());
}
