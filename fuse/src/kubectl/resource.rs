use std::{collections::BTreeMap, fmt};

use serde::Deserialize;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Strategy type for which the availability of replicas is checked during a rollout.
pub const STRATEGY_ROLLING_UPDATE: &str = "RollingUpdate";

/// Returns `namespace`, or [`DEFAULT_NAMESPACE`] when it is empty.
pub fn namespace_or_default(namespace: &str) -> &str {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE
    } else {
        namespace
    }
}

/// The resource kinds that are understood. Parsing is case-insensitive, `Deployment`,
/// `deployment` and `DEPLOYMENT` all map to [`Kind::Deployment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Deployment,
    ReplicaSet,
    Namespace,
    Pod,
    List,
}

impl Kind {
    pub fn parse(value: &str) -> Option<Self> {
        [
            Kind::Deployment,
            Kind::ReplicaSet,
            Kind::Namespace,
            Kind::Pod,
            Kind::List,
        ]
        .into_iter()
        .find(|kind| kind.as_str().eq_ignore_ascii_case(value))
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Kind::Deployment => "deployment",
            Kind::ReplicaSet => "replicaset",
            Kind::Namespace => "namespace",
            Kind::Pod => "pod",
            Kind::List => "list",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceMetadata {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub generation: i64,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Total number of non-terminated pods targeted by this resource.
    pub replicas: i64,
    /// Number of pods that run the desired template.
    pub updated_replicas: i64,
    /// Number of pods available for at least `minReadySeconds`.
    pub available_replicas: i64,
    /// Number of pods that are still required for the resource to be fully available.
    pub unavailable_replicas: i64,
    /// The generation most recently acted upon by the controller.
    pub observed_generation: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    /// For example `example.com:80/dalee/image:34`.
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodSpec {
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TemplateMetadata {
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodTemplateSpec {
    pub metadata: TemplateMetadata,
    pub spec: PodSpec,
}

/// Either an absolute number or a percentage such as `25%`, as accepted by `maxSurge` and
/// `maxUnavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IntOrPercent {
    Int(i64),
    Percent(Percent),
}

impl IntOrPercent {
    /// Resolves the value against `total`, rounding percentages down.
    pub fn resolve(self, total: i64) -> i64 {
        match self {
            IntOrPercent::Int(value) => value,
            IntOrPercent::Percent(Percent(percent)) => total * i64::from(percent) / 100,
        }
    }
}

impl Default for IntOrPercent {
    fn default() -> Self {
        IntOrPercent::Int(0)
    }
}

impl fmt::Display for IntOrPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntOrPercent::Int(value) => value.fmt(f),
            IntOrPercent::Percent(Percent(percent)) => write!(f, "{percent}%"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Percent(u32);

impl TryFrom<String> for Percent {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .strip_suffix('%')
            .and_then(|digits| digits.parse().ok())
            .map(Percent)
            .ok_or_else(|| format!("expected an integer or a percentage, got {value:?}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RollingUpdateStrategy {
    pub max_surge: IntOrPercent,
    pub max_unavailable: IntOrPercent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Strategy {
    pub r#type: String,
    pub rolling_update: RollingUpdateStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub replicas: i64,
    pub template: PodTemplateSpec,
    pub strategy: Strategy,
}

fn selector_of(labels: &BTreeMap<String, String>) -> Vec<String> {
    labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect()
}

/// [Deployment](https://kubernetes.io/docs/reference/kubernetes-api/workload-resources/deployment-v1/)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Deployment {
    pub metadata: ResourceMetadata,
    pub spec: DeploymentSpec,
    pub status: ResourceStatus,
}

impl Deployment {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        namespace_or_default(&self.metadata.namespace)
    }

    /// Unique name within a cluster, `<namespace>/<name>`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }

    pub fn generation(&self) -> i64 {
        self.metadata.generation
    }

    /// `key=value` selectors for the labels of the deployment itself.
    pub fn selector(&self) -> Vec<String> {
        selector_of(&self.metadata.labels)
    }

    /// `key=value` selectors for the labels of the pod template, matching the pods of this
    /// deployment.
    pub fn pod_selector(&self) -> Vec<String> {
        selector_of(&self.spec.template.metadata.labels)
    }

    /// Whether the rollout is complete, following
    /// https://kubernetes.io/docs/concepts/workloads/controllers/deployment/#complete-deployment.
    pub fn is_ready(&self) -> bool {
        let Self {
            metadata,
            spec,
            status,
        } = self;

        let mut is_ready = status.observed_generation >= metadata.generation
            && status.updated_replicas >= spec.replicas
            && status.unavailable_replicas == 0;

        if spec.replicas != 0 && spec.strategy.r#type == STRATEGY_ROLLING_UPDATE {
            let max_unavailable = spec
                .strategy
                .rolling_update
                .max_unavailable
                .resolve(spec.replicas);
            is_ready = is_ready && status.available_replicas >= spec.replicas - max_unavailable;
        }

        is_ready
    }

    pub fn status_line(&self) -> String {
        format!(
            "Ready: {}, Generation: meta={} observed={}, Replicas: s={}, u={}, a={}, na={}",
            self.is_ready(),
            self.metadata.generation,
            self.status.observed_generation,
            self.spec.replicas,
            self.status.updated_replicas,
            self.status.available_replicas,
            self.status.unavailable_replicas,
        )
    }
}

/// [ReplicaSet](https://kubernetes.io/docs/reference/kubernetes-api/workload-resources/replica-set-v1/)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReplicaSet {
    pub metadata: ResourceMetadata,
    pub spec: DeploymentSpec,
    pub status: ResourceStatus,
}

impl ReplicaSet {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Container images of the pod template in declaration order.
    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.spec
            .template
            .spec
            .containers
            .iter()
            .map(|container| container.image.as_str())
    }
}

/// [Pod](https://kubernetes.io/docs/reference/kubernetes-api/workload-resources/pod-v1/)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Pod {
    pub metadata: ResourceMetadata,
    pub spec: PodSpec,
    pub status: ResourceStatus,
}

impl Pod {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        namespace_or_default(&self.metadata.namespace)
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Namespace {
    pub metadata: ResourceMetadata,
}

impl Namespace {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// A decoded cluster resource. `List` documents never show up here, they are unwrapped into
/// their items while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Deployment(Deployment),
    ReplicaSet(ReplicaSet),
    Pod(Pod),
    Namespace(Namespace),
}

impl Resource {
    pub fn kind(&self) -> Kind {
        match self {
            Resource::Deployment(_) => Kind::Deployment,
            Resource::ReplicaSet(_) => Kind::ReplicaSet,
            Resource::Pod(_) => Kind::Pod,
            Resource::Namespace(_) => Kind::Namespace,
        }
    }

    pub fn metadata(&self) -> &ResourceMetadata {
        match self {
            Resource::Deployment(deployment) => &deployment.metadata,
            Resource::ReplicaSet(replica_set) => &replica_set.metadata,
            Resource::Pod(pod) => &pod.metadata,
            Resource::Namespace(namespace) => &namespace.metadata,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }
}

macro_rules! impl_resource_conversions {
    ($($variant:ident => $method:ident),* $(,)?) => {
        impl Resource {
            $(
                pub fn $method(self) -> Option<$variant> {
                    match self {
                        Resource::$variant(value) => Some(value),
                        _ => None,
                    }
                }
            )*
        }

        $(
            impl From<$variant> for Resource {
                fn from(value: $variant) -> Self {
                    Resource::$variant(value)
                }
            }
        )*
    };
}

impl_resource_conversions! {
    Deployment => into_deployment,
    ReplicaSet => into_replica_set,
    Pod => into_pod,
    Namespace => into_namespace,
}

/// The resources decoded from one YAML stream, in stream order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceList(pub Vec<Resource>);

impl ResourceList {
    pub fn filtered_by_kind(self, kind: Kind) -> Self {
        Self(
            self.0
                .into_iter()
                .filter(|resource| resource.kind() == kind)
                .collect(),
        )
    }

    pub fn deployments(self) -> Vec<Deployment> {
        self.0
            .into_iter()
            .filter_map(Resource::into_deployment)
            .collect()
    }

    pub fn replica_sets(self) -> Vec<ReplicaSet> {
        self.0
            .into_iter()
            .filter_map(Resource::into_replica_set)
            .collect()
    }

    pub fn pods(self) -> Vec<Pod> {
        self.0.into_iter().filter_map(Resource::into_pod).collect()
    }

    pub fn namespaces(self) -> Vec<Namespace> {
        self.0
            .into_iter()
            .filter_map(Resource::into_namespace)
            .collect()
    }

    pub fn first(self) -> Option<Resource> {
        self.0.into_iter().next()
    }
}

impl std::ops::Deref for ResourceList {
    type Target = [Resource];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for ResourceList {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
