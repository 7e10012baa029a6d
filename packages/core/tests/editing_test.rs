//! Neuron Editing Tests
//!
//! End-to-end tests driving `TreeEditor` through its public API against the
//! in-memory port: node creation, structural edits, annotations, tags,
//! workspace loading and remote notifications.

#[cfg(test)]
mod editing_tests {
    use anyhow::Result;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tmneuron_core::{
        DomainEvent, EditError, EditorConfig, GeoAnnotation, Id, InMemoryNeuronPort,
        NeuronMetadata, NeuronTree, TimeBasedIdGenerator, TreeEditor,
    };
    use tokio::time::{timeout, Duration};

    const WORKSPACE: Id = Id(1);

    /// Helper to create an editor over an empty in-memory port
    fn create_test_editor() -> Result<(TreeEditor, Arc<InMemoryNeuronPort>)> {
        let port = Arc::new(InMemoryNeuronPort::new());
        let editor = TreeEditor::new(
            port.clone(),
            Arc::new(TimeBasedIdGenerator::new(1)),
            EditorConfig::default()
                .with_id_block_size(128)
                .with_user_key("user:tracer"),
        )?;
        Ok((editor, port))
    }

    /// Helper to build R -> A -> B in a fresh neuron, returning (neuron, R, A, B)
    async fn create_chain(editor: &TreeEditor) -> Result<(Id, Id, Id, Id)> {
        let neuron = editor.create_neuron(WORKSPACE, "chain").await.id();
        let r = editor.add_node(neuron, neuron, 0.0, 0.0, 0.0).await?.id();
        let a = editor.add_node(neuron, r, 1.0, 0.0, 0.0).await?.id();
        let b = editor.add_node(neuron, a, 2.0, 0.0, 0.0).await?.id();
        Ok((neuron, r, a, b))
    }

    async fn snapshot(editor: &TreeEditor, neuron: Id) -> NeuronTree {
        editor.neuron(neuron).await.expect("neuron should exist")
    }

    // =========================================================================
    // Node creation
    // =========================================================================

    #[tokio::test]
    async fn test_root_count_matches_root_additions() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let neuron = editor.create_neuron(WORKSPACE, "n").await.id();

        let mut roots = 0;
        let mut last = neuron;
        for i in 0..40 {
            let parent = if i % 7 == 0 {
                roots += 1;
                neuron
            } else {
                last
            };
            last = editor.add_node(neuron, parent, i as f64, 0.0, 0.0).await?.id();
        }

        let tree = snapshot(&editor, neuron).await;
        assert_eq!(tree.count_roots(), roots);
        assert_eq!(tree.node_count(), 40);
        assert!(tree.is_consistent(), "{:?}", tree.validate());
        Ok(())
    }

    #[tokio::test]
    async fn test_add_node_under_missing_parent() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let neuron = editor.create_neuron(WORKSPACE, "n").await.id();

        let err = editor
            .add_node(neuron, Id(12345), 0.0, 0.0, 0.0)
            .await
            .unwrap_err();

        assert_eq!(err, EditError::node_not_found(neuron, Id(12345)));
        assert_eq!(snapshot(&editor, neuron).await.node_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_location_and_radius_updates_bump_modified_at() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let (neuron, r, a, _b) = create_chain(&editor).await?;
        let before = snapshot(&editor, neuron).await.node(a).cloned().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let moved = editor.update_node_location(neuron, a, 5.0, 6.0, 7.0).await?;
        assert_eq!(moved.location(), [5.0, 6.0, 7.0]);
        assert!(moved.modified_at() > before.modified_at());

        let resized = editor.update_node_radius(neuron, a, 3.5).await?;
        assert_eq!(resized.radius(), 3.5);

        // Connectivity changes leave the timestamp alone
        let stamp = snapshot(&editor, neuron).await.node(r).unwrap().modified_at();
        editor.reroot(neuron, a).await?;
        assert_eq!(snapshot(&editor, neuron).await.node(r).unwrap().modified_at(), stamp);

        let err = editor.update_node_radius(neuron, a, -1.0).await.unwrap_err();
        assert!(matches!(err, EditError::InvalidReference { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_node_comment() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let (neuron, _r, a, _b) = create_chain(&editor).await?;

        let node = editor
            .set_node_comment(neuron, a, Some("bouton".to_string()))
            .await?;
        assert_eq!(node.comment(), Some("bouton"));

        let node = editor.set_node_comment(neuron, a, None).await?;
        assert_eq!(node.comment(), None);
        Ok(())
    }

    // =========================================================================
    // Structural edits
    // =========================================================================

    #[tokio::test]
    async fn test_reroot_scenario() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let (neuron, r, a, b) = create_chain(&editor).await?;

        assert!(editor.reroot(neuron, b).await?);

        let tree = snapshot(&editor, neuron).await;
        let node = |id: Id| tree.node(id).unwrap();
        assert_eq!(node(b).parent_id(), neuron);
        assert_eq!(node(a).parent_id(), b);
        assert_eq!(node(r).parent_id(), a);
        assert_eq!(node(b).child_ids(), &[a]);
        assert_eq!(node(a).child_ids(), &[r]);
        assert!(node(r).child_ids().is_empty());
        assert_eq!(tree.root_ids(), &[b]);
        assert!(tree.is_consistent(), "{:?}", tree.validate());

        // Rerooting back restores the original shape
        assert!(editor.reroot(neuron, r).await?);
        let restored = snapshot(&editor, neuron).await;
        assert_eq!(restored.root_ids(), &[r]);
        assert_eq!(restored.node(r).unwrap().child_ids(), &[a]);
        assert_eq!(restored.node(a).unwrap().child_ids(), &[b]);
        assert_eq!(restored.node(b).unwrap().parent_id(), a);
        Ok(())
    }

    #[tokio::test]
    async fn test_cycle_creating_reparent_is_ignored() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let (neuron, r, _a, b) = create_chain(&editor).await?;
        let before = snapshot(&editor, neuron).await;

        assert!(!editor.reparent(neuron, r, b).await?);
        assert_eq!(snapshot(&editor, neuron).await, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_split_then_merge_back() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let (neuron, r, a, b) = create_chain(&editor).await?;

        assert!(editor.split(neuron, a).await?);
        let tree = snapshot(&editor, neuron).await;
        assert_eq!(tree.count_roots(), 2);
        assert_eq!(tree.node(a).unwrap().child_ids(), &[b]);
        assert!(tree.node(r).unwrap().child_ids().is_empty());

        assert!(editor.merge_neurite(neuron, a, neuron, r).await?);
        let tree = snapshot(&editor, neuron).await;
        assert_eq!(tree.root_ids(), &[r]);
        assert_eq!(tree.node(a).unwrap().parent_id(), r);
        assert!(tree.is_consistent(), "{:?}", tree.validate());

        // Same neurite: nothing to merge
        assert!(!editor.merge_neurite(neuron, b, neuron, r).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_subtree_between_neurons() -> Result<()> {
        let (editor, port) = create_test_editor()?;
        let (source, r, a, b) = create_chain(&editor).await?;
        let target = editor.create_neuron(WORKSPACE, "target").await.id();
        editor.add_anchored_path(source, a, b, vec![vec![1, 2, 3]]).await?;
        editor.add_structured_text(source, b, "ending").await?;
        let mut events = editor.subscribe_to_events();

        let moved = editor.move_subtree(source, target, b).await?.unwrap();

        assert_eq!(moved.root_id, r);
        assert_eq!(moved.node_ids.len(), 3);
        assert_eq!(moved.paths_moved, 1);
        assert_eq!(moved.texts_moved, 1);

        let source_tree = snapshot(&editor, source).await;
        let target_tree = snapshot(&editor, target).await;
        assert_eq!(source_tree.node_count(), 0);
        assert_eq!(source_tree.path_count(), 0);
        for id in [r, a, b] {
            assert_eq!(target_tree.node(id).unwrap().neuron_id(), target);
        }
        assert_eq!(target_tree.root_ids(), &[r]);
        assert_eq!(target_tree.path_count(), 1);
        assert_eq!(target_tree.text(b).unwrap().data(), "ending");

        let mut saw_move = false;
        while let Ok(Ok(event)) = timeout(Duration::from_millis(100), events.recv()).await {
            if let DomainEvent::SubtreeMoved {
                source_neuron_id,
                target_neuron_id,
                node_count,
                ..
            } = event
            {
                assert_eq!((source_neuron_id, target_neuron_id, node_count), (source, target, 3));
                saw_move = true;
            }
        }
        assert!(saw_move);

        editor.flush().await;
        assert_eq!(port.stored(target).await.unwrap().node_count(), 3);
        assert_eq!(port.stored(source).await.unwrap().node_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_merge_neurite_across_neurons() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let (source, r, a, b) = create_chain(&editor).await?;
        let target = editor.create_neuron(WORKSPACE, "target").await.id();
        let t_root = editor.add_node(target, target, 9.0, 9.0, 9.0).await?.id();

        assert!(editor.merge_neurite(source, b, target, t_root).await?);

        let tree = snapshot(&editor, target).await;
        assert_eq!(tree.root_ids(), &[t_root]);
        assert_eq!(tree.node(b).unwrap().parent_id(), t_root);
        assert_eq!(tree.node(a).unwrap().parent_id(), b);
        assert_eq!(tree.node(r).unwrap().parent_id(), a);
        assert!(tree.is_consistent(), "{:?}", tree.validate());
        assert_eq!(snapshot(&editor, source).await.node_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_link_and_subtree() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let (neuron, r, a, b) = create_chain(&editor).await?;
        let c = editor.add_node(neuron, a, 3.0, 0.0, 0.0).await?.id();

        let removed = editor.delete_link(neuron, a).await?;
        assert_eq!(removed.id(), a);
        let tree = snapshot(&editor, neuron).await;
        let children: BTreeSet<Id> = tree.node(r).unwrap().child_ids().iter().copied().collect();
        assert_eq!(children, BTreeSet::from([b, c]));

        let removed = editor.delete_subtree(neuron, r).await?;
        assert_eq!(removed.len(), 3);
        let tree = snapshot(&editor, neuron).await;
        assert_eq!(tree.node_count(), 0);
        assert_eq!(tree.count_roots(), 0);
        Ok(())
    }

    // =========================================================================
    // Annotations
    // =========================================================================

    #[tokio::test]
    async fn test_anchored_paths() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let (neuron, r, a, _b) = create_chain(&editor).await?;

        let path = editor
            .add_anchored_path(neuron, a, r, vec![vec![0, 0, 0], vec![1, 1, 1]])
            .await?;
        assert_eq!(path.endpoints().first(), r.min(a));
        assert_eq!(path.points().len(), 2);

        let err = editor
            .add_anchored_path(neuron, a, Id(777), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::InvalidReference { .. }));

        let err = editor
            .add_anchored_path(neuron, a, r, vec![vec![1, 2]])
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::InvalidReference { .. }));
        assert_eq!(snapshot(&editor, neuron).await.path_count(), 1);

        // Endpoint order does not matter
        assert!(editor.remove_anchored_path(neuron, r, a).await?.is_some());
        assert!(editor.remove_anchored_path(neuron, r, a).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_structured_text_lifecycle() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let (neuron, _r, a, _b) = create_chain(&editor).await?;

        editor.add_structured_text(neuron, a, "soma?").await?;
        let err = editor
            .add_structured_text(neuron, a, "again")
            .await
            .unwrap_err();
        assert_eq!(err, EditError::duplicate_annotation(neuron, a));

        let updated = editor.update_structured_text(neuron, a, "soma").await?;
        assert_eq!(updated.unwrap().data(), "soma");

        assert!(editor.delete_structured_text(neuron, a).await?.is_some());
        assert!(editor.delete_structured_text(neuron, a).await?.is_none());
        assert!(editor.update_structured_text(neuron, a, "x").await?.is_none());

        // Text on the neuron itself
        editor.add_structured_text(neuron, neuron, "notes").await?;
        assert!(snapshot(&editor, neuron).await.text(neuron).is_some());
        Ok(())
    }

    // =========================================================================
    // Neurons, metadata and tags
    // =========================================================================

    #[tokio::test]
    async fn test_create_neuron_runs_completion_after_port_ack() -> Result<()> {
        let (editor, port) = create_test_editor()?;
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();

        let neuron = editor
            .create_neuron_with_completion(WORKSPACE, "pending", move |tree| {
                assert_eq!(tree.metadata().name, "pending");
                flag.store(true, Ordering::SeqCst);
            })
            .await;
        editor.flush().await;

        assert!(done.load(Ordering::SeqCst));
        assert_eq!(neuron.metadata().owner_key.as_deref(), Some("user:tracer"));
        assert!(port.stored(neuron.id()).await.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_neuron_tolerates_missing() -> Result<()> {
        let (editor, port) = create_test_editor()?;
        let neuron = editor.create_neuron(WORKSPACE, "doomed").await.id();
        editor.add_tag(neuron, "review").await?;

        assert!(editor.delete_neuron(neuron).await);
        assert!(!editor.delete_neuron(neuron).await);
        assert!(editor.neuron(neuron).await.is_none());
        assert!(editor
            .tag_index()
            .neurons_with_tag("review")
            .await
            .is_empty());

        editor.flush().await;
        assert!(port.stored(neuron).await.is_none());
        assert_eq!(port.call_counts().deletes, 1);

        let err = editor.reroot(neuron, Id(1)).await.unwrap_err();
        assert_eq!(err, EditError::neuron_not_found(neuron));
        Ok(())
    }

    #[tokio::test]
    async fn test_metadata_edits_are_persisted() -> Result<()> {
        let (editor, port) = create_test_editor()?;
        let neuron = editor.create_neuron(WORKSPACE, "old").await.id();

        editor.rename_neuron(neuron, "new").await?;
        editor.set_neuron_visibility(neuron, false).await?;
        editor.set_neuron_color(neuron, Some([1.0, 0.5, 0.0])).await?;
        editor.flush().await;

        let stored = port.stored(neuron).await.unwrap();
        assert_eq!(stored.metadata().name, "new");
        assert!(!stored.metadata().visible);
        assert_eq!(stored.metadata().color, Some([1.0, 0.5, 0.0]));
        Ok(())
    }

    #[tokio::test]
    async fn test_tags_update_index_and_metadata() -> Result<()> {
        let (editor, _port) = create_test_editor()?;
        let neuron7 = editor.create_neuron(WORKSPACE, "seven").await.id();
        let index = editor.tag_index();

        assert!(editor.add_tag(neuron7, "auto").await?);
        assert!(!editor.add_tag(neuron7, "auto").await?);
        assert!(index.neurons_with_tag("auto").await.contains(&neuron7));
        assert!(snapshot(&editor, neuron7).await.metadata().tags.contains("auto"));

        assert!(editor.remove_tag(neuron7, "auto").await?);
        assert!(index.tags_of(neuron7).await.is_empty());
        assert!(!index.neurons_with_tag("auto").await.contains(&neuron7));
        assert!(index.all_tags().await.contains("auto"));

        editor.add_tag(neuron7, "a").await?;
        editor.add_tag(neuron7, "b").await?;
        let cleared = editor.clear_tags(neuron7).await?;
        assert_eq!(cleared.len(), 2);
        assert!(snapshot(&editor, neuron7).await.metadata().tags.is_empty());
        assert!(index.neurons_with_tag("a").await.is_empty());
        Ok(())
    }

    // =========================================================================
    // Loading and remote notifications
    // =========================================================================

    /// Neuron as a store would hand it back: parent links only
    fn stored_neuron(id: i64, tags: &[&str]) -> NeuronTree {
        let neuron_id = Id(id);
        let mut metadata = NeuronMetadata::new(neuron_id, WORKSPACE, format!("stored {}", id));
        metadata.tags = tags.iter().map(|t| t.to_string()).collect();
        let mut tree = NeuronTree::new(metadata);
        tree.insert_node(GeoAnnotation::new(Id(id + 1), neuron_id, neuron_id, 0.0, 0.0, 0.0).unwrap());
        tree.insert_node(GeoAnnotation::new(Id(id + 2), Id(id + 1), neuron_id, 1.0, 0.0, 0.0).unwrap());
        tree.insert_node(GeoAnnotation::new(Id(id + 3), Id(id + 2), neuron_id, 2.0, 0.0, 0.0).unwrap());
        tree
    }

    #[tokio::test]
    async fn test_load_workspace_initializes_neurons() -> Result<()> {
        let (editor, port) = create_test_editor()?;
        port.seed(stored_neuron(100, &["traced"])).await;
        port.seed(stored_neuron(200, &[])).await;

        assert_eq!(editor.load_workspace(WORKSPACE).await?, 2);

        assert_eq!(editor.neuron_ids().await, vec![Id(100), Id(200)]);
        let tree = snapshot(&editor, Id(100)).await;
        assert_eq!(tree.root_ids(), &[Id(101)]);
        assert_eq!(tree.node(Id(102)).unwrap().child_ids(), &[Id(103)]);
        assert!(tree.is_consistent(), "{:?}", tree.validate());
        assert_eq!(
            editor.tag_index().neurons_with_tag("traced").await,
            BTreeSet::from([Id(100)])
        );

        // Loaded neurons are editable straight away
        assert!(editor.reroot(Id(100), Id(103)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_remote_update_and_delete() -> Result<()> {
        let (editor, port) = create_test_editor()?;
        let mut events = editor.subscribe_to_events();

        editor.apply_remote_update(stored_neuron(300, &["review"])).await;
        assert_eq!(
            events.recv().await?,
            DomainEvent::RemoteUpdateApplied { neuron_id: Id(300) }
        );
        assert_eq!(snapshot(&editor, Id(300)).await.count_roots(), 1);
        assert!(editor
            .tag_index()
            .tags_of(Id(300))
            .await
            .contains("review"));

        assert!(editor.apply_remote_delete(Id(300)).await);
        assert!(!editor.apply_remote_delete(Id(300)).await);

        editor.flush().await;
        let counts = port.call_counts();
        assert_eq!(counts.saves, 0);
        assert_eq!(counts.deletes, 0);
        Ok(())
    }
}
