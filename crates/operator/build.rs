use group_sync_types::*;
use kube::CustomResourceExt;
use std::fs;

fn main() {
    fs::create_dir_all("../../crds").unwrap();
    fs::write(
        "../../crds/groupsync.redhatcop.redhat.io_groupsyncs.yaml",
        serde_yaml::to_string(&GroupSync::crd()).unwrap(),
    )
    .unwrap();
}
