//! Default workflow template.

use crate::error::ControllerError;
use minijinja::{Environment, UndefinedBehavior, context};
use regex::Regex;
use std::sync::LazyLock;

/// Devices whose partitions are named `<device>p<N>`
static P_PARTITIONED_DEVICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/dev/(nvme\d+n\d+|mmcblk\d+)$").expect("partition device pattern is valid")
});

/// `{{.device_1}}` is left for the workflow engine to expand.
const WORKFLOW_TEMPLATE: &str = r#"version: "0.1"
name: {{ name }}
global_timeout: 6000
tasks:
  - name: "{{ name }}"
    worker: "{% raw %}{{.device_1}}{% endraw %}"
    volumes:
      - /dev:/dev
      - /dev/console:/dev/console
      - /lib/firmware:/lib/firmware:ro
    actions:
      - name: "stream-image"
        image: quay.io/tinkerbell-actions/image2disk:v1.0.0
        timeout: 600
        environment:
          DEST_DISK: {{ dest_disk }}
          IMG_URL: {{ image_url }}
          COMPRESSED: true
      - name: "add-tink-cloud-init-config"
        image: quay.io/tinkerbell-actions/writefile:v1.0.0
        timeout: 90
        environment:
          DEST_DISK: {{ dest_partition }}
          FS_TYPE: ext4
          DEST_PATH: /etc/cloud/cloud.cfg.d/10_tinkerbell.cfg
          UID: 0
          GID: 0
          MODE: 0600
          DIRMODE: 0700
          CONTENTS: |
            datasource:
              Ec2:
                metadata_urls: ["{{ metadata_url }}"]
                strict_id: false
            system_info:
              default_user:
                name: tink
                groups: [wheel, adm]
                sudo: ["ALL=(ALL) NOPASSWD:ALL"]
                shell: /bin/bash
            manage_etc_hosts: localhost
            warnings:
              dsid_missing_source: off
      - name: "add-tink-cloud-init-ds-config"
        image: quay.io/tinkerbell-actions/writefile:v1.0.0
        timeout: 90
        environment:
          DEST_DISK: {{ dest_partition }}
          FS_TYPE: ext4
          DEST_PATH: /etc/cloud/ds-identify.cfg
          UID: 0
          GID: 0
          MODE: 0600
          DIRMODE: 0700
          CONTENTS: |
            datasource: Ec2
      - name: "kexec-image"
        image: quay.io/tinkerbell-actions/kexec:v1.0.0
        timeout: 90
        pid: host
        environment:
          BLOCK_DEVICE: {{ dest_partition }}
          FS_TYPE: ext4
"#;

/// First partition of a block device: `/dev/nvme0n1` -> `/dev/nvme0n1p1`,
/// `/dev/sda` -> `/dev/sda1`
pub fn first_partition(device: &str) -> String {
    if P_PARTITIONED_DEVICE.is_match(device) {
        format!("{device}p1")
    } else {
        format!("{device}1")
    }
}

/// Inputs of the default workflow template
#[derive(Debug, Clone)]
pub struct WorkflowTemplate<'a> {
    pub name: &'a str,
    pub metadata_url: &'a str,
    pub image_url: &'a str,
    pub dest_disk: &'a str,
    pub dest_partition: &'a str,
}

impl WorkflowTemplate<'_> {
    pub fn render(&self) -> Result<String, ControllerError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        let ctx = context! {
            name => self.name,
            metadata_url => self.metadata_url,
            image_url => self.image_url,
            dest_disk => self.dest_disk,
            dest_partition => self.dest_partition,
        };

        env.render_str(WORKFLOW_TEMPLATE, ctx)
            .map_err(|e| ControllerError::render(format!("workflow template {}", self.name), e))
    }
}
