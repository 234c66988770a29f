use std::thread;

use quorum_core::diff::{DetailsInput, TagInput};
use quorum_core::{EditId, EditStatus, EngineConfig, EntityId, UserId, VoteType};
use quorum_engine::{EditSubmission, Engine, EngineError, ErrorKind};
use quorum_harness::{Event, TestEnv};

fn rename(tag: EntityId, name: &str) -> EditSubmission {
    EditSubmission::modify(
        tag,
        DetailsInput::Tag(TagInput { name: name.to_string().into(), ..Default::default() }),
    )
}

fn cast_all(engine: &mut Engine, voters: &[UserId], edit_id: EditId) -> Vec<Result<EditStatus, EngineError>> {
    voters
        .iter()
        .map(|voter| engine.vote_on_edit(*voter, edit_id, VoteType::Accept).map(|e| e.status))
        .collect()
}

#[test]
fn racing_engines_resolve_an_edit_once() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::on_disk(EngineConfig::default())?;
    let tag = env.create_tag("Outdoor")?;
    let edit = env.submit(rename(tag, "Outside"))?;
    env.notifier.clear();

    let edit_id = edit.id;
    let mut other = env.second_engine()?;
    let (first_voters, second_voters) = env.voters[..4].split_at(2);
    let (first, second) = (&mut env.engine, &mut other);
    let results: Vec<_> = thread::scope(|s| {
        let a = s.spawn(move || cast_all(first, first_voters, edit_id));
        let b = s.spawn(move || cast_all(second, second_voters, edit_id));
        [a.join(), b.join()]
    })
    .into_iter()
    .map(|r| r.map_err(|_| "voting thread panicked"))
    .collect::<Result<Vec<_>, _>>()?
    .into_iter()
    .flatten()
    .collect();

    let accepted = results.iter().filter(|r| matches!(r, Ok(EditStatus::Accepted))).count();
    let pending = results.iter().filter(|r| matches!(r, Ok(EditStatus::Pending))).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::StateConflict))
        .count();
    assert_eq!((accepted, pending, conflicts), (1, 2, 1), "{results:?}");

    let closed = env.edit(edit.id)?;
    assert_eq!(closed.status, EditStatus::Accepted);
    assert!(closed.applied);
    assert_eq!(closed.vote_count, 3);
    assert_eq!(env.engine.votes(edit.id)?.len(), 3);
    assert_eq!(env.engine.tag(tag)?.ok_or("tag missing")?.name.as_deref(), Some("Outside"));
    let applied = env.notifier.events().into_iter().filter(|e| *e == Event::ApplyEdit(edit.id)).count();
    assert_eq!(applied, 1);
    Ok(())
}

#[test]
fn second_engine_sees_a_decision_made_by_the_first() -> Result<(), Box<dyn std::error::Error>> {
    let mut env = TestEnv::on_disk(EngineConfig::default())?;
    let tag = env.create_tag("Outdoor")?;
    let edit = env.submit(rename(tag, "Outside"))?;
    let mut other = env.second_engine()?;

    env.engine.vote_on_edit(env.voters[0], edit.id, VoteType::Accept)?;
    env.engine.vote_on_edit(env.voters[1], edit.id, VoteType::Accept)?;
    let accepted = other.vote_on_edit(env.voters[2], edit.id, VoteType::Accept)?;
    assert_eq!(accepted.status, EditStatus::Accepted);

    let err = env.engine.vote_on_edit(env.voters[3], edit.id, VoteType::Accept).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    let err = other.apply_edit(env.admin, edit.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    assert_eq!(env.engine.votes(edit.id)?.len(), 3);
    Ok(())
}
