mod common;

use std::thread;

use common::*;
use coral::prelude::*;
use coral::session::current_session_id;

fn session_error(result: CoralResult<impl Sized>) -> Option<SessionError> {
    match result {
        Err(CoralError::Session(err)) => Some(err),
        _ => None,
    }
}

#[test]
fn test_session_acts_for_its_principal() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.root_session()?;
    assert_eq!(session.principal(), "root");
    assert_eq!(session.user_subject()?.name(), "root");
    assert_eq!(current_session_id(), Some(session.id()));

    let anonymous = coral.anonymous_session()?;
    assert_eq!(anonymous.user_subject()?.name(), "anonymous");
    Ok(())
}

#[test]
fn test_unknown_principal_is_rejected() {
    let coral = temp_coral();
    assert!(matches!(
        coral.session("nobody"),
        Err(CoralError::EntityDoesNotExist {
            kind: EntityKind::Subject,
            ..
        })
    ));
}

#[test]
fn test_only_the_current_session_may_be_used() -> CoralResult<()> {
    let coral = temp_coral();
    let first = coral.root_session()?;
    let second = coral.anonymous_session()?;

    assert_eq!(
        session_error(first.store().root_resource()),
        Some(SessionError::NotCurrent)
    );
    second.store().root_resource()?;

    first.make_current()?;
    first.store().root_resource()?;
    assert_eq!(
        session_error(second.store().root_resource()),
        Some(SessionError::NotCurrent)
    );
    Ok(())
}

#[test]
fn test_sessions_are_bound_to_their_thread() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.root_session()?;

    let (from_other_thread, make_current) = thread::scope(|scope| {
        scope
            .spawn(|| {
                (
                    session_error(session.store().root_resource()),
                    session.make_current(),
                )
            })
            .join()
            .unwrap()
    });
    assert_eq!(from_other_thread, Some(SessionError::WrongThread));
    assert_eq!(make_current, Err(SessionError::WrongThread));
    assert!(session.event().is_ok());

    // each thread borrows its own session
    let other = coral.clone();
    let name = thread::spawn(move || {
        let session = other.root_session().ok()?;
        let subject = session.user_subject().ok()?;
        Some(subject.name().to_owned())
    })
    .join()
    .unwrap();
    assert_eq!(name.as_deref(), Some("root"));
    Ok(())
}

#[test]
fn test_closed_sessions_return_to_the_pool() -> CoralResult<()> {
    let coral = temp_coral();
    let session = coral.root_session()?;
    let id = session.id();
    assert_eq!(coral.idle_sessions("root"), 0);

    session.close();
    assert!(session.is_closed());
    assert_eq!(current_session_id(), None);
    assert_eq!(coral.idle_sessions("root"), 1);
    assert_eq!(
        session_error(session.store().root_resource()),
        Some(SessionError::Closed)
    );
    assert_eq!(session.make_current(), Err(SessionError::Closed));

    // closing again, or dropping, does not pool it twice
    session.close();
    drop(session);
    assert_eq!(coral.idle_sessions("root"), 1);

    let again = coral.root_session()?;
    assert_eq!(again.id(), id);
    assert_eq!(coral.idle_sessions("root"), 0);
    Ok(())
}

#[test]
fn test_pool_is_bounded() -> CoralResult<()> {
    init_logging();
    let coral = Coral::open(CoralConfig::builder().max_idle_sessions(1).build())?;
    let a = coral.root_session()?;
    let b = coral.root_session()?;
    drop(a);
    drop(b);
    assert_eq!(coral.idle_sessions("root"), 1);
    Ok(())
}

#[test]
fn test_custom_builtin_names() -> CoralResult<()> {
    init_logging();
    let config = CoralConfig::builder()
        .root_subject("admin")
        .anonymous_subject("guest")
        .root_role("administrators")
        .build();
    let coral = Coral::open(config)?;
    let session = coral.root_session()?;
    assert_eq!(session.principal(), "admin");
    assert_eq!(session.security().root_role()?.name(), "administrators");
    assert!(coral.session("root").is_err());
    drop(session);
    assert_eq!(coral.anonymous_session()?.user_subject()?.name(), "guest");
    Ok(())
}
