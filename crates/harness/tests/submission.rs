use quorum_core::details::ListChange;
use quorum_core::diff::{DetailsInput, FieldInput, PerformerInput, SceneInput, TagInput};
use quorum_core::{EditStatus, EngineConfig, Operation, Role, VoteType};
use quorum_engine::{EditSubmission, ErrorKind};
use quorum_harness::{Event, TestEnv};

fn tag_input(name: &str) -> DetailsInput {
    DetailsInput::Tag(TagInput { name: name.to_string().into(), ..Default::default() })
}

// ============================================================================
// Creates
// ============================================================================

#[test]
fn create_is_applied_at_submission() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let input = DetailsInput::Tag(TagInput {
        name: "Outdoor".to_string().into(),
        description: "Filmed outside".to_string().into(),
        ..Default::default()
    });
    let edit = env.submit(EditSubmission::create(input).with_comment("new tag"))?;

    assert_eq!(edit.status, EditStatus::ImmediateAccepted);
    assert!(edit.applied);
    assert!(edit.closed_at.is_some());

    let tag = env.engine.tag(edit.target_id.ok_or("no target")?)?.ok_or("tag missing")?;
    assert_eq!(tag.name.as_deref(), Some("Outdoor"));
    assert_eq!(tag.description.as_deref(), Some("Filmed outside"));

    let comments = env.engine.comments(edit.id)?;
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].user_id, Some(env.editor));

    assert_eq!(
        env.notifier.events(),
        vec![Event::CreateEdit(edit.id), Event::ApplyEdit(edit.id)]
    );
    Ok(())
}

#[test]
fn create_waits_for_votes_when_auto_apply_is_off() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig { auto_apply_creates: false, ..Default::default() };
    let mut env = TestEnv::with_config(config)?;

    let edit = env.submit(EditSubmission::create(tag_input("Outdoor")))?;
    assert_eq!(edit.status, EditStatus::Pending);
    assert_eq!(edit.target_id, None);

    let edit = env.votes(edit.id, VoteType::Accept, 3)?;
    assert_eq!(edit.status, EditStatus::Accepted);
    let tag = env.engine.tag(edit.target_id.ok_or("no target")?)?.ok_or("tag missing")?;
    assert_eq!(tag.name.as_deref(), Some("Outdoor"));
    Ok(())
}

#[test]
fn scene_create_links_tags_and_performers() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let studio = env.create_studio("Northlight", None)?;
    let tag = env.create_tag("Outdoor")?;
    let performer = env.create_performer("Jane Doe")?;

    let scene_id = env.create_scene("Opening", Some(studio), &[tag], &[(performer, Some("Janie"))])?;
    let scene = env.engine.scene(scene_id)?.ok_or("scene missing")?;
    assert_eq!(scene.studio_id, Some(studio));
    assert_eq!(scene.tags, vec![tag]);
    assert_eq!(scene.performers.len(), 1);
    assert_eq!(scene.performers[0].performer_id, performer);
    assert_eq!(scene.performers[0].as_name.as_deref(), Some("Janie"));
    Ok(())
}

// ============================================================================
// Modify round trip
// ============================================================================

#[test]
fn accepted_modify_reads_back_new_values_and_keeps_the_rest() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let created = env.submit(EditSubmission::create(DetailsInput::Performer(PerformerInput {
        name: "Jane Doe".to_string().into(),
        country: "US".to_string().into(),
        height: FieldInput::Value(170),
        hair_color: "brunette".to_string().into(),
        ..Default::default()
    })))?;
    let performer = created.target_id.ok_or("no target")?;

    let edit = env.submit(EditSubmission::modify(
        performer,
        DetailsInput::Performer(PerformerInput {
            country: "CA".to_string().into(),
            height: FieldInput::Cleared,
            eye_color: "blue".to_string().into(),
            aliases: ListChange { added: vec!["J. Doe".into()], removed: vec![] },
            ..Default::default()
        }),
    ))?;
    assert_eq!(edit.status, EditStatus::Pending);
    assert_eq!(edit.operation, Operation::Modify);

    let edit = env.votes(edit.id, VoteType::Accept, 3)?;
    assert_eq!(edit.status, EditStatus::Accepted);
    assert!(edit.applied);

    let read = env.engine.performer(performer)?.ok_or("performer missing")?;
    assert_eq!(read.country.as_deref(), Some("CA"));
    assert_eq!(read.height, None);
    assert_eq!(read.eye_color.as_deref(), Some("blue"));
    assert_eq!(read.aliases, vec!["J. Doe".to_string()]);
    // Untouched fields.
    assert_eq!(read.name.as_deref(), Some("Jane Doe"));
    assert_eq!(read.hair_color.as_deref(), Some("brunette"));
    Ok(())
}

#[test]
fn modify_without_changes_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let tag = env.create_tag("Outdoor")?;
    let err = env
        .submit(EditSubmission::modify(tag, tag_input("Outdoor")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("edit contains no changes"));
    Ok(())
}

#[test]
fn scene_dates_must_be_fuzzy_dates() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let bad = DetailsInput::Scene(SceneInput {
        title: "Opening".to_string().into(),
        date: "March 2004".to_string().into(),
        ..Default::default()
    });
    let err = env.submit(EditSubmission::create(bad)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let good = DetailsInput::Scene(SceneInput {
        title: "Opening".to_string().into(),
        date: "2004-03".to_string().into(),
        ..Default::default()
    });
    let edit = env.submit(EditSubmission::create(good))?;
    let scene = env.engine.scene(edit.target_id.ok_or("no target")?)?.ok_or("scene missing")?;
    assert_eq!(scene.date.as_deref(), Some("2004-03"));
    Ok(())
}

// ============================================================================
// Permissions
// ============================================================================

#[test]
fn submitting_needs_the_edit_role() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let reader = env.user("reader", &[Role::Read])?;
    let err = env
        .engine
        .create_edit(reader, EditSubmission::create(tag_input("Outdoor")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let muted = env.user("muted", &[Role::Edit, Role::ReadOnly])?;
    let err = env
        .engine
        .create_edit(muted, EditSubmission::create(tag_input("Outdoor")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    Ok(())
}

#[test]
fn bot_edits_need_the_bot_role() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let err = env
        .submit(EditSubmission::create(tag_input("Outdoor")).as_bot())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let bot = env.user("importer", &[Role::Edit, Role::Bot])?;
    let edit = env
        .engine
        .create_edit(bot, EditSubmission::create(tag_input("Outdoor")).as_bot())?;
    assert!(edit.bot);
    Ok(())
}

#[test]
fn tag_role_gates_tag_edits_when_required() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig { require_tag_role: true, ..Default::default() };
    let mut env = TestEnv::with_config(config)?;

    let err = env.create_tag("Outdoor").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    env.create_performer("Jane Doe")?;

    let curator = env.user("curator", &[Role::Edit, Role::EditTags])?;
    let edit = env
        .engine
        .create_edit(curator, EditSubmission::create(tag_input("Outdoor")))?;
    assert_eq!(edit.status, EditStatus::ImmediateAccepted);
    Ok(())
}

#[test]
fn references_must_name_live_entities() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::new()?;
    let tag = env.create_tag("Outdoor")?;
    let destroy = env.submit(EditSubmission::destroy(quorum_core::TargetType::Tag, tag))?;
    env.engine.apply_edit(env.admin, destroy.id)?;

    let err = env.create_scene("Opening", None, &[tag], &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}
