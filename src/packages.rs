//! Package surface: create, upload bits, stage into a droplet

use crate::config::StagerConfig;
use crate::error::{StagerError, StagerResult};
use crate::staging::{Stager, StagingHandle};
use crate::store::{
    BlobstoreKind, Job, JobQueue, PackageRecord, PackageState, PackageType, SpaceRecord, StagingDb,
};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

pub const BITS_ALREADY_UPLOADED: &str =
    "Bits may be uploaded only once. Create a new package to upload different bits.";

/// Body of a package create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCreateMessage {
    pub space_guid: String,
    pub package_type: Option<String>,
    pub url: Option<String>,
    error: Option<String>,
}

impl PackageCreateMessage {
    pub fn new(space_guid: &str, package_type: Option<&str>, url: Option<&str>) -> Self {
        Self {
            space_guid: space_guid.to_string(),
            package_type: package_type.map(str::to_string),
            url: url.map(str::to_string),
            error: None,
        }
    }

    /// Parse a JSON body. A body that is not a JSON object is kept as an
    /// error reported by [`PackageCreateMessage::validate`].
    pub fn from_json(space_guid: &str, body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => Self::new(
                space_guid,
                fields.get("type").and_then(Value::as_str),
                fields.get("url").and_then(Value::as_str),
            ),
            Ok(_) => Self {
                error: Some("invalid request body".to_string()),
                ..Self::new(space_guid, None, None)
            },
            Err(e) => Self {
                error: Some(e.to_string()),
                ..Self::new(space_guid, None, None)
            },
        }
    }

    /// Every problem with the message, in field order.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        if let Some(error) = &self.error {
            return Err(vec![error.clone()]);
        }

        let errors: Vec<String> = [self.validate_type(), self.validate_url()]
            .into_iter()
            .flatten()
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_type(&self) -> Option<String> {
        match self.package_type.as_deref() {
            None => Some("The type field is required".to_string()),
            Some(t) if PackageType::parse(t).is_none() => Some(format!(
                "The type field needs to be one of '{}'",
                PackageType::ALL.join(", ")
            )),
            Some(_) => None,
        }
    }

    fn validate_url(&self) -> Option<String> {
        match (self.package_type.as_deref(), &self.url) {
            (Some("bits"), Some(_)) => {
                Some("The url field cannot be provided when type is bits.".to_string())
            }
            (Some("docker"), None) => {
                Some("The url field must be provided for type docker.".to_string())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageUploadMessage {
    pub package_guid: String,
    pub bits_path: Option<String>,
}

impl PackageUploadMessage {
    pub fn new(package_guid: &str, bits_path: Option<&str>) -> Self {
        Self {
            package_guid: package_guid.to_string(),
            bits_path: bits_path.map(str::to_string),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.bits_path {
            Some(_) => Ok(()),
            None => Err("An application zip file must be uploaded.".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageStagingMessage {
    pub package_guid: String,
    pub droplet_guid: Option<String>,
}

impl PackageStagingMessage {
    pub fn new(package_guid: &str, droplet_guid: Option<&str>) -> Self {
        Self {
            package_guid: package_guid.to_string(),
            droplet_guid: droplet_guid.map(str::to_string),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.droplet_guid {
            Some(_) => Ok(()),
            None => Err("A droplet guid must be given.".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

/// Authorization collaborator deciding what the requester may do in a space.
pub trait AccessContext: Send + Sync {
    fn can(&self, action: Action, space_guid: &str) -> bool;

    fn cannot(&self, action: Action, space_guid: &str) -> bool {
        !self.can(action, space_guid)
    }
}

/// Access context that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminAccess;

impl AccessContext for AdminAccess {
    fn can(&self, _action: Action, _space_guid: &str) -> bool {
        true
    }
}

pub struct PackagesHandler {
    db: StagingDb,
    jobs: Arc<dyn JobQueue>,
    stager: Arc<Stager>,
    config: Arc<StagerConfig>,
}

impl PackagesHandler {
    pub fn new(
        db: StagingDb,
        jobs: Arc<dyn JobQueue>,
        stager: Arc<Stager>,
        config: Arc<StagerConfig>,
    ) -> Self {
        Self {
            db,
            jobs,
            stager,
            config,
        }
    }

    /// Create a package. Bits packages start CREATED and wait for an upload;
    /// docker packages reference an existing image and are READY at once.
    pub fn create(
        &self,
        message: &PackageCreateMessage,
        access: &dyn AccessContext,
    ) -> StagerResult<PackageRecord> {
        message
            .validate()
            .map_err(|errors| StagerError::Validation(errors.join(" ")))?;
        let package_type = message
            .package_type
            .as_deref()
            .and_then(PackageType::parse)
            .ok_or_else(|| StagerError::Validation("The type field is required".to_string()))?;

        let space = self.space(&message.space_guid)?;
        if access.cannot(Action::Create, &space.guid) {
            return Err(StagerError::Unauthorized(format!("create package in {}", space.guid)));
        }

        let package = PackageRecord {
            guid: Uuid::new_v4().to_string(),
            space_guid: space.guid,
            package_type,
            url: message.url.clone(),
            state: match package_type {
                PackageType::Bits => PackageState::Created,
                PackageType::Docker => PackageState::Ready,
            },
            bits_path: None,
            package_hash: None,
        };
        self.db.store_package(&package)?;
        crate::log_packages_info!(
            "Created {:?} package {} in space {}",
            package.package_type,
            package.guid,
            package.space_guid
        );
        Ok(package)
    }

    /// Accept uploaded bits once and hand them to the transfer job.
    pub fn upload(
        &self,
        message: &PackageUploadMessage,
        access: &dyn AccessContext,
    ) -> StagerResult<PackageRecord> {
        message.validate().map_err(StagerError::Validation)?;
        let bits_path = message.bits_path.clone().unwrap_or_default();

        let package = self
            .db
            .get_package(&message.package_guid)?
            .ok_or_else(|| StagerError::NotFound(format!("Package {}", message.package_guid)))?;
        if package.package_type != PackageType::Bits {
            return Err(StagerError::Validation("Package type must be bits.".to_string()));
        }
        if package.state != PackageState::Created {
            return Err(StagerError::BitsAlreadyUploaded(BITS_ALREADY_UPLOADED.to_string()));
        }
        let space = self.space(&package.space_guid)?;
        if access.cannot(Action::Create, &space.guid) {
            return Err(StagerError::Unauthorized(format!("upload to package {}", package.guid)));
        }

        let updated = self
            .db
            .modify_package(&package.guid, |package| {
                if package.state != PackageState::Created {
                    return Err(StagerError::BitsAlreadyUploaded(
                        BITS_ALREADY_UPLOADED.to_string(),
                    ));
                }
                package.state = PackageState::Pending;
                package.bits_path = Some(bits_path.clone());
                Ok(package.clone())
            })?
            .ok_or_else(|| StagerError::NotFound(format!("Package {}", package.guid)))?;

        self.jobs.enqueue(
            &self.config.jobs.local_queue,
            Job::PackageBits {
                package_guid: updated.guid.clone(),
                bits_path,
            },
        )?;
        crate::log_packages_info!("Bits upload for package {} enqueued", updated.guid);
        Ok(updated)
    }

    /// Mark the transfer job's work as done: the package becomes READY.
    pub fn upload_complete(&self, package_guid: &str, package_hash: &str) -> StagerResult<PackageRecord> {
        let hash = package_hash.to_string();
        let package = self
            .db
            .modify_package(package_guid, |package| {
                if package.state != PackageState::Pending {
                    return Err(StagerError::Conflict(format!(
                        "Package {} is not waiting for bits",
                        package.guid
                    )));
                }
                package.state = PackageState::Ready;
                package.package_hash = Some(hash.clone());
                package.bits_path = None;
                Ok(package.clone())
            })?
            .ok_or_else(|| StagerError::NotFound(format!("Package {}", package_guid)))?;
        crate::log_packages_info!("Package {} is ready", package.guid);
        Ok(package)
    }

    /// Delete the package and schedule removal of its blob.
    pub fn delete(&self, guid: &str, access: &dyn AccessContext) -> StagerResult<Option<PackageRecord>> {
        let removed = self.db.remove_package_if(guid, |package| {
            if access.cannot(Action::Delete, &package.space_guid) {
                return Err(StagerError::Unauthorized(format!("delete package {}", package.guid)));
            }
            Ok(())
        })?;

        if let Some(package) = &removed {
            self.jobs.enqueue(
                &self.config.jobs.generic_queue,
                Job::BlobstoreDelete {
                    key: package.guid.clone(),
                    blobstore: BlobstoreKind::Package,
                },
            )?;
            crate::log_packages_info!("Deleted package {}", package.guid);
        }
        Ok(removed)
    }

    pub fn show(&self, guid: &str, access: &dyn AccessContext) -> StagerResult<Option<PackageRecord>> {
        match self.db.get_package(guid)? {
            Some(package) if access.cannot(Action::Read, &package.space_guid) => {
                Err(StagerError::Unauthorized(format!("read package {}", package.guid)))
            }
            other => Ok(other),
        }
    }

    /// Stage a READY package into the given droplet.
    pub async fn stage(
        &self,
        message: &PackageStagingMessage,
        access: &dyn AccessContext,
    ) -> StagerResult<StagingHandle> {
        message.validate().map_err(StagerError::Validation)?;
        let droplet_guid = message.droplet_guid.clone().unwrap_or_default();

        let package = self
            .db
            .get_package(&message.package_guid)?
            .ok_or_else(|| StagerError::NotFound(format!("Package {}", message.package_guid)))?;
        let droplet = self
            .db
            .get_droplet(&droplet_guid)?
            .ok_or_else(|| StagerError::NotFound(format!("Droplet {}", droplet_guid)))?;
        if access.cannot(Action::Read, &package.space_guid)
            || access.cannot(Action::Update, &droplet.space_guid)
        {
            return Err(StagerError::Unauthorized(format!(
                "stage package {} into droplet {}",
                package.guid, droplet.guid
            )));
        }
        if package.state != PackageState::Ready {
            return Err(StagerError::Conflict(format!(
                "Package {} is not ready for staging",
                package.guid
            )));
        }

        self.stager.stage_package(package, droplet).await
    }

    fn space(&self, guid: &str) -> StagerResult<SpaceRecord> {
        self.db
            .get_space(guid)?
            .ok_or_else(|| StagerError::NotFound(format!("Space {}", guid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_without_url_is_valid() {
        let message = PackageCreateMessage::new("space-1", Some("bits"), None);
        assert_eq!(message.validate(), Ok(()));
    }

    #[test]
    fn docker_without_url_is_rejected() {
        let message = PackageCreateMessage::new("space-1", Some("docker"), None);
        assert_eq!(
            message.validate(),
            Err(vec!["The url field must be provided for type docker.".to_string()])
        );
    }

    #[test]
    fn bits_with_url_is_rejected() {
        let message = PackageCreateMessage::new("space-1", Some("bits"), Some("http://x"));
        assert_eq!(
            message.validate(),
            Err(vec!["The url field cannot be provided when type is bits.".to_string()])
        );
    }

    #[test]
    fn unknown_type_lists_the_valid_ones() {
        let message = PackageCreateMessage::new("space-1", Some("zip"), None);
        assert_eq!(
            message.validate(),
            Err(vec!["The type field needs to be one of 'bits, docker'".to_string()])
        );
    }

    #[test]
    fn missing_type_is_required() {
        let message = PackageCreateMessage::from_json("space-1", br#"{}"#);
        assert_eq!(
            message.validate(),
            Err(vec!["The type field is required".to_string()])
        );
    }

    #[test]
    fn non_object_body_is_an_error() {
        let message = PackageCreateMessage::from_json("space-1", b"[1, 2]");
        assert_eq!(message.validate(), Err(vec!["invalid request body".to_string()]));
        assert!(PackageCreateMessage::from_json("space-1", b"{nope").validate().is_err());
    }

    #[test]
    fn upload_and_stage_messages_require_their_field() {
        assert_eq!(
            PackageUploadMessage::new("pkg", None).validate(),
            Err("An application zip file must be uploaded.".to_string())
        );
        assert_eq!(
            PackageStagingMessage::new("pkg", None).validate(),
            Err("A droplet guid must be given.".to_string())
        );
    }
}
