use quorum_core::diff::{DetailsInput, PerformerInput, TagInput};
use quorum_core::{EditStatus, EngineConfig, EntityId, TargetType, VoteType};
use quorum_engine::{EditSubmission, ErrorKind};
use quorum_harness::{Event, TestEnv};

fn tag_input(name: &str) -> DetailsInput {
    DetailsInput::Tag(TagInput { name: name.to_string().into(), ..Default::default() })
}

fn rename(tag: EntityId, name: &str) -> EditSubmission {
    EditSubmission::modify(tag, tag_input(name))
}

#[test]
fn amending_replaces_details_and_clears_votes() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig { edit_update_limit: 2, ..Default::default() };
    let mut env = TestEnv::with_config(config)?;
    let tag = env.create_tag("Outdoor")?;
    let edit = env.submit(rename(tag, "Outside"))?;
    env.votes(edit.id, VoteType::Accept, 2)?;
    env.notifier.clear();

    let amended = env
        .engine
        .update_edit(env.editor, edit.id, tag_input("Outdoors"), Some("typo".into()))?;
    assert_eq!(amended.update_count, 1);
    assert_eq!(amended.vote_count, 0);
    assert_eq!(amended.updated_at, Some(env.engine.now()));
    assert_eq!(amended.status, EditStatus::Pending);
    assert!(env.engine.votes(edit.id)?.is_empty());
    assert_eq!(env.engine.comments(edit.id)?.len(), 1);
    assert_eq!(env.notifier.events(), vec![Event::UpdateEdit(edit.id)]);

    let amended = env.engine.update_edit(env.editor, edit.id, tag_input("Outdoor scenes"), None)?;
    assert_eq!(amended.update_count, 2);

    // Earlier votes no longer count toward the threshold.
    let edit = env.votes(edit.id, VoteType::Accept, 3)?;
    assert_eq!(edit.status, EditStatus::Accepted);
    assert_eq!(env.engine.tag(tag)?.ok_or("tag missing")?.name.as_deref(), Some("Outdoor scenes"));
    Ok(())
}

#[test]
fn amendments_stop_at_the_update_limit() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let tag = env.create_tag("Outdoor")?;
    let edit = env.submit(rename(tag, "Outside"))?;

    env.engine.update_edit(env.editor, edit.id, tag_input("Outdoors"), None)?;
    let err = env
        .engine
        .update_edit(env.editor, edit.id, tag_input("Outdoor scenes"), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    assert!(err.to_string().contains("edit update limit reached"));
    assert_eq!(env.edit(edit.id)?.update_count, 1);
    Ok(())
}

#[test]
fn only_the_submitter_may_amend() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let tag = env.create_tag("Outdoor")?;
    let edit = env.submit(rename(tag, "Outside"))?;

    let err = env
        .engine
        .update_edit(env.voters[0], edit.id, tag_input("Outdoors"), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = env
        .engine
        .update_edit(env.admin, edit.id, tag_input("Outdoors"), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(env.edit(edit.id)?.update_count, 0);
    Ok(())
}

#[test]
fn destroy_and_closed_edits_cannot_be_amended() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let tag = env.create_tag("Outdoor")?;

    let destroy = env.submit(EditSubmission::destroy(TargetType::Tag, tag))?;
    let err = env
        .engine
        .update_edit(env.editor, destroy.id, tag_input("Outdoors"), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    let canceled = env.submit(rename(tag, "Outside"))?;
    env.engine.cancel_edit(env.editor, canceled.id)?;
    let err = env
        .engine
        .update_edit(env.editor, canceled.id, tag_input("Outdoors"), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    Ok(())
}

#[test]
fn amendment_must_keep_the_target_type() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let tag = env.create_tag("Outdoor")?;
    let edit = env.submit(rename(tag, "Outside"))?;

    let performer = DetailsInput::Performer(PerformerInput {
        name: "Jane Doe".to_string().into(),
        ..Default::default()
    });
    let err = env.engine.update_edit(env.editor, edit.id, performer, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}
