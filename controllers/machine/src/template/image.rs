//! OS image URL resolution.
//!
//! Image lookup formats use Go template field syntax, e.g.
//! `{{.BaseRegistry}}/{{.OSDistro}}-{{.OSVersion}}.gz`, including the
//! `{{-`/`-}}` whitespace trim markers. Fields are rewritten to minijinja
//! expressions and the text between them is kept verbatim in raw blocks.
//! Rendering uses strict undefined handling, so an unknown field is an error
//! rather than an empty string.

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, machine_identity};
use crds::{CLUSTER_NAME_LABEL, TinkerbellClusterSpec, TinkerbellMachine, TinkerbellMachineSpec};
use minijinja::{Environment, UndefinedBehavior, context};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static GO_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(-\s)?\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*(\s-)?\}\}").expect("Go field pattern is valid")
});

/// Image lookup settings after machine overrides are applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageLookup {
    pub format: Option<String>,
    pub base_registry: Option<String>,
    pub os_distro: Option<String>,
    pub os_version: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

impl ImageLookup {
    pub fn from_machine(spec: &TinkerbellMachineSpec) -> Self {
        Self {
            format: non_empty(spec.image_lookup_format.as_ref()),
            base_registry: non_empty(spec.image_lookup_base_registry.as_ref()),
            os_distro: non_empty(spec.image_lookup_os_distro.as_ref()),
            os_version: non_empty(spec.image_lookup_os_version.as_ref()),
        }
    }

    /// Fills every unset field from the cluster defaults
    #[must_use]
    pub fn or_cluster(self, cluster: &TinkerbellClusterSpec) -> Self {
        Self {
            format: self.format.or_else(|| non_empty(cluster.image_lookup_format.as_ref())),
            base_registry: self
                .base_registry
                .or_else(|| non_empty(cluster.image_lookup_base_registry.as_ref())),
            os_distro: self.os_distro.or_else(|| non_empty(cluster.image_lookup_os_distro.as_ref())),
            os_version: self.os_version.or_else(|| non_empty(cluster.image_lookup_os_version.as_ref())),
        }
    }

    /// Renders the image URL.
    ///
    /// The distro is lower-cased and dots are stripped from the OS version;
    /// the registry and Kubernetes version are used verbatim.
    pub fn image_url(&self, kubernetes_version: &str) -> Result<String, ControllerError> {
        let format = self
            .format
            .as_deref()
            .ok_or_else(|| ControllerError::render("image URL", "no image lookup format configured"))?;

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        let ctx = context! {
            BaseRegistry => self.base_registry.as_deref().unwrap_or_default(),
            OSDistro => self.os_distro.as_deref().unwrap_or_default().to_lowercase(),
            OSVersion => self.os_version.as_deref().unwrap_or_default().replace('.', ""),
            KubernetesVersion => kubernetes_version,
        };

        let describe = || format!("image URL from format {format:?}");
        let source = go_to_minijinja(format).map_err(|e| ControllerError::render(describe(), e))?;
        env.render_str(&source, ctx)
            .map_err(|e| ControllerError::render(describe(), e))
    }
}

/// Go trims spaces, tabs and newlines next to `{{-` and `-}}`
fn is_go_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Rewrites `{{.Field}}` to `{{ Field }}` and wraps the text between fields
/// in raw blocks so minijinja does not interpret it.
fn go_to_minijinja(format: &str) -> Result<String, String> {
    let mut source = String::with_capacity(format.len() * 2);
    let mut text_start = 0;
    let mut trim_leading = false;

    for caps in GO_FIELD.captures_iter(format) {
        let Some(action) = caps.get(0) else { continue };

        let mut text = &format[text_start..action.start()];
        if trim_leading {
            text = text.trim_start_matches(is_go_space);
        }
        if caps.get(1).is_some() {
            text = text.trim_end_matches(is_go_space);
        }
        push_text(&mut source, text)?;

        source.push_str("{{ ");
        source.push_str(&caps[2]);
        source.push_str(" }}");

        trim_leading = caps.get(3).is_some();
        text_start = action.end();
    }

    let mut text = &format[text_start..];
    if trim_leading {
        text = text.trim_start_matches(is_go_space);
    }
    push_text(&mut source, text)?;

    Ok(source)
}

fn push_text(source: &mut String, text: &str) -> Result<(), String> {
    if text.is_empty() {
        return Ok(());
    }
    // Any action left over is not a plain field reference
    if text.contains("{{") {
        return Err(format!("unsupported template action in {text:?}"));
    }

    source.push_str("{% raw %}");
    // Split `endraw` across two raw blocks so literal text cannot close one
    source.push_str(&text.replace("endraw", "endr{% endraw %}{% raw %}aw"));
    source.push_str("{% endraw %}");
    Ok(())
}

impl Reconciler {
    /// Image lookup for a machine, with defaults from its TinkerbellCluster.
    ///
    /// The cluster is the one named by the machine's cluster-name label in the
    /// machine's namespace; a machine without the label gets no defaults.
    pub(crate) async fn image_lookup(&self, machine: &TinkerbellMachine) -> Result<ImageLookup, ControllerError> {
        let lookup = ImageLookup::from_machine(&machine.spec);

        let Some(cluster_name) = machine.metadata.labels.as_ref().and_then(|l| l.get(CLUSTER_NAME_LABEL)) else {
            return Ok(lookup);
        };

        let (namespace, _) = machine_identity(machine)?;
        let cluster = self.store.get_cluster(namespace, cluster_name).await.map_err(|e| {
            if e.is_not_found() {
                ControllerError::NotFound {
                    kind: "TinkerbellCluster",
                    name: format!("{namespace}/{cluster_name}"),
                }
            } else {
                ControllerError::store(format!("reading TinkerbellCluster {namespace}/{cluster_name}"), e)
            }
        })?;

        debug!("Using image defaults from TinkerbellCluster {}/{}", namespace, cluster_name);
        Ok(lookup.or_cluster(&cluster.spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use crds::TinkerbellCluster;
    use hardware_store::MockStore;

    fn lookup(format: &str) -> ImageLookup {
        ImageLookup {
            format: Some(format.to_string()),
            base_registry: Some("reg.example.com".to_string()),
            os_distro: Some("Ubuntu".to_string()),
            os_version: Some("20.04".to_string()),
        }
    }

    #[test]
    fn test_image_url_field_transforms() {
        let url = lookup("{{.BaseRegistry}}/os/{{.OSDistro}}:{{.OSVersion}}")
            .image_url("v1.23.5")
            .unwrap();
        assert_eq!(url, "reg.example.com/os/ubuntu:2004");
    }

    #[test]
    fn test_image_url_kubernetes_version_is_verbatim() {
        let url = lookup(TEST_IMAGE_FORMAT).image_url("v1.23.5").unwrap();
        assert_eq!(url, "reg.example.com/ubuntu-2004-kube-v1.23.5.raw.gz");
    }

    #[test]
    fn test_unknown_field_is_render_error() {
        let err = lookup("{{.Registry}}/image").image_url("v1.23.5").unwrap_err();
        assert!(matches!(err, ControllerError::Render { .. }));
    }

    #[test]
    fn test_malformed_format_is_render_error() {
        let err = lookup("{{.BaseRegistry}/image").image_url("v1.23.5").unwrap_err();
        assert!(matches!(err, ControllerError::Render { .. }));
    }

    #[test]
    fn test_literal_text_is_not_template_syntax() {
        let url = lookup("{{.BaseRegistry}}/img{#x}/{% if %}/{{.OSVersion}}.gz")
            .image_url("v1")
            .unwrap();
        assert_eq!(url, "reg.example.com/img{#x}/{% if %}/2004.gz");

        let url = lookup("{{.OSDistro}}/{% endraw %}").image_url("v1").unwrap();
        assert_eq!(url, "ubuntu/{% endraw %}");
    }

    #[test]
    fn test_trim_markers_strip_adjacent_whitespace() {
        let url = lookup("  {{- .BaseRegistry -}} \n /x").image_url("v1").unwrap();
        assert_eq!(url, "reg.example.com/x");

        let url = lookup("a {{- .OSDistro }} b").image_url("v1").unwrap();
        assert_eq!(url, "aubuntu b");
    }

    #[test]
    fn test_missing_format_is_render_error() {
        let mut no_format = lookup("");
        no_format.format = None;
        assert!(matches!(no_format.image_url("v1"), Err(ControllerError::Render { .. })));
    }

    #[test]
    fn test_machine_fields_override_cluster_defaults() {
        let machine = TinkerbellMachineSpec {
            image_lookup_os_distro: Some("Flatcar".to_string()),
            image_lookup_os_version: Some(String::new()),
            ..Default::default()
        };
        let cluster = TinkerbellClusterSpec {
            image_lookup_format: Some("{{.OSDistro}}".to_string()),
            image_lookup_os_distro: Some("Ubuntu".to_string()),
            image_lookup_os_version: Some("22.04".to_string()),
            ..Default::default()
        };

        let merged = ImageLookup::from_machine(&machine).or_cluster(&cluster);
        assert_eq!(merged.format.as_deref(), Some("{{.OSDistro}}"));
        assert_eq!(merged.os_distro.as_deref(), Some("Flatcar"));
        assert_eq!(merged.os_version.as_deref(), Some("22.04"));
        assert_eq!(merged.base_registry, None);
    }

    #[tokio::test]
    async fn test_cluster_defaults_follow_cluster_label() {
        let store = MockStore::new();
        let mut cluster = TinkerbellCluster::new(
            "workload",
            TinkerbellClusterSpec {
                image_lookup_format: Some("{{.OSDistro}}.img".to_string()),
                ..Default::default()
            },
        );
        cluster.metadata.namespace = Some(TEST_NAMESPACE.to_string());
        store.add_cluster(cluster);
        let reconciler = create_test_reconciler(&store);

        let mut machine = create_test_machine("m1");
        machine.spec.image_lookup_format = None;
        assert_eq!(reconciler.image_lookup(&machine).await.unwrap().format, None);

        machine.metadata.labels = Some([(CLUSTER_NAME_LABEL.to_string(), "workload".to_string())].into());
        let resolved = reconciler.image_lookup(&machine).await.unwrap();
        assert_eq!(resolved.image_url("v1").unwrap(), "ubuntu.img");

        machine.metadata.labels = Some([(CLUSTER_NAME_LABEL.to_string(), "missing".to_string())].into());
        let err = reconciler.image_lookup(&machine).await.unwrap_err();
        assert!(matches!(err, ControllerError::NotFound { kind: "TinkerbellCluster", .. }));
    }
}
