use kube::core::CustomResourceExt;
use store_operator::crd::store::Store;

fn main() {
    let crd = Store::crd();
    let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
    println!("{}", yaml);
}
