/// Cluster API resources managed on the management cluster
pub mod facade;
pub mod manifests;
pub mod resources;
pub mod status;

pub use facade::{KubeResourceFacade, ObservedObject, ResourceFacade};
pub use manifests::{Manifest, ManifestBuilder};
pub use resources::{ObjectRef, ResourceKind};
