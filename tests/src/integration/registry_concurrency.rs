//! # Registry Under Contention
//!
//! Many tasks racing to register the same identifier must leave exactly one
//! active handler, and every caller must see that same handler.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::TestNode;
    use continuum_core::domain::{BoxError, ServiceDescriptor, ServiceFunction};
    use continuum_core::{RegistryError, ServiceIdentifier, ServiceRegistry};
    use serde_json::json;
    use std::sync::Arc;

    fn tagged_service(tag: usize) -> ServiceDescriptor {
        ServiceDescriptor::builder(ServiceIdentifier::named("Inventory", "2.0").unwrap())
            .function(ServiceFunction::blocking("owner", [], move |_| {
                Ok::<_, BoxError>(tag)
            }))
            .build()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_registrations_leave_one_handler() {
        let node = TestNode::new();
        let registry: Arc<ServiceRegistry> = Arc::new(node.registry);

        let mut tasks = tokio::task::JoinSet::new();
        for tag in 0..32 {
            let registry = registry.clone();
            tasks.spawn(async move { (tag, registry.register(tagged_service(tag)).await) });
        }

        let mut winners = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                (tag, Ok(())) => winners.push(tag),
                (_, Err(RegistryError::AlreadyRegistered(id))) => {
                    assert_eq!(id.qualified_name(), "Inventory");
                }
                (_, Err(other)) => panic!("unexpected registration error: {other}"),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(registry.service_count(), 1);

        let id = ServiceIdentifier::named("Inventory", "2.0").unwrap();
        assert_eq!(node.bus.listener_count(&id.cri().base_resource()), 1);

        // Every proxy reaches the winner and only the winner replies.
        for _ in 0..4 {
            let proxy = registry.service_proxy(&id, None).unwrap();
            let owner = proxy.call_typed::<usize>("owner", vec![]).await.unwrap();
            assert_eq!(owner, winners[0]);
        }
    }

    #[tokio::test]
    async fn test_reregister_after_unregister() {
        let node = TestNode::new();
        let id = ServiceIdentifier::named("Inventory", "2.0").unwrap();

        node.registry.register(tagged_service(1)).await.unwrap();
        node.registry.unregister(&id).await.unwrap();
        assert!(!node.registry.is_registered(&id));
        assert_eq!(node.bus.listener_count(&id.cri().base_resource()), 0);

        node.registry.register(tagged_service(2)).await.unwrap();
        let proxy = node.registry.service_proxy(&id, None).unwrap();
        assert_eq!(proxy.call("owner", vec![]).await.unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_versions_register_independently() {
        let node = TestNode::new();
        let v1 = ServiceDescriptor::builder(ServiceIdentifier::named("Inventory", "1.0").unwrap())
            .function(ServiceFunction::blocking("owner", [], |_| Ok::<_, BoxError>("v1")))
            .build()
            .unwrap();

        node.registry.register(v1).await.unwrap();
        node.registry.register(tagged_service(7)).await.unwrap();
        assert_eq!(node.registry.service_count(), 2);

        let v1_id = ServiceIdentifier::named("Inventory", "1.0").unwrap();
        let v2_id = ServiceIdentifier::named("Inventory", "2.0").unwrap();
        let v1_proxy = node.registry.service_proxy(&v1_id, None).unwrap();
        let v2_proxy = node.registry.service_proxy(&v2_id, None).unwrap();
        assert_eq!(v1_proxy.call("owner", vec![]).await.unwrap(), json!("v1"));
        assert_eq!(v2_proxy.call("owner", vec![]).await.unwrap(), json!(7));

        node.registry.shutdown().await;
        assert_eq!(node.registry.service_count(), 0);
    }
}
