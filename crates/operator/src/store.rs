//! The external "platform group store" collaborator. [`PlatformGroupStore`] is
//! the interface the Reconciliation Engine depends on;
//! [`KubeGroupStore`] is a concrete binding against the `user.openshift.io/v1
//! Group` kind the upstream `redhat-cop/group-sync-operator` targets — the
//! engine itself never names that GVK, only this module does.

use crate::error::Error;
use async_trait::async_trait;
use group_sync_types::PlatformGroup;
use kube::{
    api::{ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams},
    Api, Client,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[async_trait]
pub trait PlatformGroupStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<PlatformGroup>, Error>;
    async fn list_by_label(&self, label_selector: &str) -> Result<Vec<PlatformGroup>, Error>;
    /// Creates or replaces the group's spec entirely (users/annotations/labels),
    /// returning the store's copy with `uid` populated.
    async fn upsert(&self, group: &PlatformGroup) -> Result<PlatformGroup, Error>;
    async fn delete(&self, name: &str) -> Result<(), Error>;
}

const MANAGER_NAME: &str = "group-sync-operator";

pub struct KubeGroupStore {
    api: Api<DynamicObject>,
    resource: ApiResource,
}

impl KubeGroupStore {
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk("user.openshift.io", "v1", "Group");
        let resource = ApiResource::from_gvk(&gvk);
        let api = Api::all_with(client, &resource);
        KubeGroupStore { api, resource }
    }

    fn to_platform_group(obj: &DynamicObject) -> PlatformGroup {
        let users = obj
            .data
            .get("users")
            .and_then(Value::as_array)
            .map(|v| {
                v.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let labels: BTreeMap<String, String> = obj
            .metadata
            .labels
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();
        let annotations: BTreeMap<String, String> = obj
            .metadata
            .annotations
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();
        PlatformGroup {
            name: obj.metadata.name.clone().unwrap_or_default(),
            uid: obj.metadata.uid.clone(),
            users,
            annotations,
            labels,
        }
    }
}

#[async_trait]
impl PlatformGroupStore for KubeGroupStore {
    async fn get(&self, name: &str) -> Result<Option<PlatformGroup>, Error> {
        match self.api.get(name).await {
            Ok(obj) => Ok(Some(Self::to_platform_group(&obj))),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(None),
            Err(source) => Err(store_failure(name, source)),
        }
    }

    async fn list_by_label(&self, label_selector: &str) -> Result<Vec<PlatformGroup>, Error> {
        let params = kube::api::ListParams::default().labels(label_selector);
        let list = self
            .api
            .list(&params)
            .await
            .map_err(|source| store_failure(label_selector, source))?;
        Ok(list.items.iter().map(Self::to_platform_group).collect())
    }

    async fn upsert(&self, group: &PlatformGroup) -> Result<PlatformGroup, Error> {
        let body = json!({
            "apiVersion": "user.openshift.io/v1",
            "kind": "Group",
            "metadata": {
                "name": group.name,
                "labels": group.labels,
                "annotations": group.annotations,
            },
            "users": group.users,
        });
        let patch = Patch::Apply(&body);
        let params = PatchParams::apply(MANAGER_NAME).force();
        let obj = self
            .api
            .patch(&group.name, &params, &patch)
            .await
            .map_err(|source| store_failure(&group.name, source))?;
        let _ = &self.resource;
        Ok(Self::to_platform_group(&obj))
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        match self.api.delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(source) => Err(store_failure(name, source)),
        }
    }
}

fn store_failure(group: &str, source: kube::Error) -> Error {
    Error::PlatformStoreFailure {
        group: group.to_owned(),
        source: Box::new(source),
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory `PlatformGroupStore` fake used by the engine's unit tests.
    #[derive(Default)]
    pub struct InMemoryGroupStore {
        groups: Mutex<HashMap<String, PlatformGroup>>,
        next_uid: Mutex<u64>,
    }

    impl InMemoryGroupStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn snapshot(&self) -> HashMap<String, PlatformGroup> {
            self.groups.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlatformGroupStore for InMemoryGroupStore {
        async fn get(&self, name: &str) -> Result<Option<PlatformGroup>, Error> {
            Ok(self.groups.lock().unwrap().get(name).cloned())
        }

        async fn list_by_label(&self, label_selector: &str) -> Result<Vec<PlatformGroup>, Error> {
            // Only supports the single `sync-provider=<value>` selector shape
            // the engine issues — a full label-selector parser would be
            // more test double than this fake needs.
            let (key, value) = label_selector
                .split_once('=')
                .expect("fake only supports key=value selectors");
            Ok(self
                .groups
                .lock()
                .unwrap()
                .values()
                .filter(|g| g.labels.get(key).map(String::as_str) == Some(value))
                .cloned()
                .collect())
        }

        async fn upsert(&self, group: &PlatformGroup) -> Result<PlatformGroup, Error> {
            let mut groups = self.groups.lock().unwrap();
            let mut stored = group.clone();
            stored.uid = match groups.get(&group.name).and_then(|g| g.uid.clone()) {
                Some(uid) => Some(uid),
                None => {
                    let mut next = self.next_uid.lock().unwrap();
                    *next += 1;
                    Some(format!("fake-uid-{}", *next))
                }
            };
            groups.insert(group.name.clone(), stored.clone());
            Ok(stored)
        }

        async fn delete(&self, name: &str) -> Result<(), Error> {
            self.groups.lock().unwrap().remove(name);
            Ok(())
        }
    }
}
