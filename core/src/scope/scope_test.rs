use alloc::sync::Arc;

use pretty_assertions::assert_eq;

use super::*;
use crate::gc::CollectError;
use crate::memory::Handle;
use crate::program::{ExternalFunction, Function, ProgramImage};
use crate::test_utils::{Sample, counter_archive, init_test_logging};
use crate::types::TypeRef;
use crate::values::{BlockData, raw};
use crate::vm::{Interpreter, Machine, Parameters, RunError};
use crate::{String, Vec, vec};

struct Texture;

fn no_externals(_: &str) -> Option<ExternalFunction> {
    None
}

fn load(archive: &crate::program::ProgramArchive) -> ProgramImage {
    let mut image = ProgramImage::new(no_externals);
    image.set_code(&archive.to_octets().unwrap(), "scope").unwrap();
    image
}

/// `main(delta, state) = delta + state`
struct Counter;

impl Interpreter for Counter {
    fn run(
        &mut self,
        machine: &mut Machine<'_>,
        _function: &Function,
        parameters: Parameters<'_>,
    ) -> Result<(), RunError> {
        let delta = parameters.read_i32(0).ok_or_else(|| RunError::trap("no delta"))?;
        let state = parameters.read_i32(4).ok_or_else(|| RunError::trap("no state"))?;
        unsafe { raw::write_i32(machine.bp().as_ptr(), delta + state) };
        Ok(())
    }
}

fn counter_info(parameters: &[u8]) -> ExecuteInfo<'_> {
    ExecuteInfo {
        parameter_octet_count: 8,
        parameter_count: 1,
        expected_return_octet_size: 4,
        parameters,
    }
}

fn counter_params(delta: i32, state: i32) -> [u8; 8] {
    let mut octets = [0u8; 8];
    octets[..4].copy_from_slice(&delta.to_ne_bytes());
    octets[4..].copy_from_slice(&state.to_ne_bytes());
    octets
}

/// Adds `delta` to the score, appends the new score to `scores`, keeps the
/// texture (registering one on the first tick) and leaves `garbage` octets
/// of unreachable data behind in the arena.
struct Game {
    sample: Sample,
    name: &'static str,
    garbage: usize,
    corrupt: bool,
}

impl Game {
    fn new(garbage: usize) -> Self {
        Game {
            sample: Sample::new(),
            name: "ada",
            garbage,
            corrupt: false,
        }
    }

    fn state_offsets(&self) -> Vec<usize> {
        let s = &self.sample;
        let fields = [s.int, s.string, s.int_list, s.texture, s.shape_list];
        s.types.fields_layout(&fields).unwrap().offsets
    }

    fn info<'a>(&self, parameters: &'a [u8]) -> ExecuteInfo<'a> {
        ExecuteInfo {
            parameter_octet_count: parameters.len(),
            parameter_count: 2,
            expected_return_octet_size: self.sample.state_size(),
            parameters,
        }
    }

    /// Parameter octets for `delta` and the scope's last state.
    fn params(&self, scope: &Scope<'_>, delta: i32) -> Vec<u8> {
        let s = &self.sample;
        let layout = s.types.fields_layout(&[s.int, s.state]).unwrap();
        let mut octets = vec![0u8; layout.layout.size];
        octets[..4].copy_from_slice(&delta.to_ne_bytes());
        if !scope.last_state().is_empty() {
            let state = scope.state_octets(scope.last_state()).unwrap();
            octets[layout.offsets[1]..].copy_from_slice(state);
        }
        octets
    }

    fn dump(&self, scope: &Scope<'_>) -> String {
        let mut out = String::new();
        scope.write_state(scope.last_state(), &mut out).unwrap();
        out
    }
}

impl Interpreter for Game {
    fn run(
        &mut self,
        machine: &mut Machine<'_>,
        _function: &Function,
        parameters: Parameters<'_>,
    ) -> Result<(), RunError> {
        let s = &self.sample;
        let offsets = self.state_offsets();
        let state_offset = s.types.fields_layout(&[s.int, s.state])?.offsets[1];
        let delta = parameters.read_i32(0).ok_or_else(|| RunError::trap("no delta"))?;
        let old = parameters.as_bytes()[state_offset..].as_ptr();

        let (score, mut scores, handle) = unsafe {
            let score = raw::read_i32(old.add(offsets[0])) + delta;
            let list = s.types.list_block(s.int)?;
            let scores: Vec<i32> = match BlockData::from_slot(old.add(offsets[2])) {
                Some(block) => (0..block.len())
                    .map(|i| raw::read_i32(block.element(list, i)))
                    .collect(),
                None => Vec::new(),
            };
            (score, scores, raw::read_handle(old.add(offsets[3])))
        };
        scores.push(score);

        machine.alloc_bytes(&vec![0xee; self.garbage])?;
        let handle = if handle.is_null() {
            machine.register(Arc::new(Texture))?
        } else {
            handle
        };

        let bp = machine.bp().as_ptr();
        let arena = machine.arena();
        unsafe {
            s.write_state(bp, arena, machine.handles_mut(), score, self.name, &scores, None);
            raw::write_handle(bp.add(offsets[3]), handle);
            if self.corrupt {
                let shapes = BlockData::from_slot(bp.add(offsets[4])).unwrap();
                *shapes.element(s.types.list_block(s.shape)?, 0) = 9;
            }
        }
        Ok(())
    }
}

fn tick(scope: &mut Scope<'_>, game: &mut Game, delta: i32) {
    let params = game.params(scope, delta);
    let info = game.info(&params);
    scope.execute(game, &info).unwrap();
}

#[test]
fn test_round_trip() {
    init_test_logging();
    let image = load(&counter_archive());
    let mut scope = Scope::init(&image, None, 1024).unwrap();
    assert_eq!(scope.active_slot(), 0);

    let params = counter_params(5, 10);
    let state = *scope.execute(&mut Counter, &counter_info(&params)).unwrap();

    assert!(!state.is_empty());
    assert_eq!(state.octet_count(), 4);
    assert_eq!(state.ty(), Some(TypeRef(0)));
    assert_eq!(scope.active_slot(), 1);
    assert_eq!(scope.state_octets(&state).unwrap(), &15i32.to_ne_bytes());
}

#[test]
fn test_size_mismatch_leaves_scope_untouched() {
    let image = load(&counter_archive());
    let mut scope = Scope::init(&image, None, 1024).unwrap();
    let params = counter_params(1, 2);
    scope.execute(&mut Counter, &counter_info(&params)).unwrap();
    let before = *scope.last_state();
    let octets = scope.state_octets(&before).unwrap().to_vec();
    let used = scope.used_memory().used();

    let wrong_return = ExecuteInfo {
        expected_return_octet_size: 8,
        ..counter_info(&params)
    };
    assert_eq!(
        scope.execute(&mut Counter, &wrong_return).unwrap_err(),
        ScopeError::ReturnSizeMismatch {
            expected: 8,
            actual: 4
        }
    );

    let wrong_params = ExecuteInfo {
        parameter_octet_count: 4,
        ..counter_info(&params[..4])
    };
    assert_eq!(
        scope.execute(&mut Counter, &wrong_params).unwrap_err(),
        ScopeError::ParameterSizeMismatch {
            function: "main".into(),
            expected: 4,
            actual: 8
        }
    );

    let short = counter_info(&params[..6]);
    assert_eq!(
        scope.execute(&mut Counter, &short).unwrap_err(),
        ScopeError::ArgumentLengthMismatch {
            declared: 8,
            actual: 6
        }
    );

    assert_eq!(*scope.last_state(), before);
    assert_eq!(scope.active_slot(), 1);
    assert_eq!(scope.used_memory().used(), used);
    assert_eq!(scope.state_octets(&before).unwrap(), octets.as_slice());
}

#[test]
fn test_slots_alternate() {
    let image = load(&counter_archive());
    let mut scope = Scope::init(&image, None, 1024).unwrap();
    let mut total = 0;

    for i in 0..10 {
        let params = counter_params(i, total);
        let state = *scope.execute(&mut Counter, &counter_info(&params)).unwrap();
        total += i;
        assert_eq!(scope.active_slot(), ((i + 1) % 2) as usize);
        assert_eq!(state.slot(), scope.active_slot());
        assert_eq!(scope.state_octets(&state).unwrap(), &total.to_ne_bytes());
    }
}

#[test]
fn test_garbage_is_reclaimed_every_tick() {
    let mut game = Game::new(1000);
    let image = load(&game.sample.archive());
    let mut scope = Scope::init(&image, None, 4096).unwrap();

    // Without reclaiming, a few ticks would exhaust the arena.
    for _ in 0..50 {
        tick(&mut scope, &mut game, 1);
        assert!(scope.used_memory().used() < 1024);
        assert_eq!(scope.used_handles().len(), 1);
        assert!(scope.next_handles().is_empty());
    }
    assert!(game.dump(&scope).starts_with("{score: 50, name: \"ada\", scores: [1, 2, 3,"));
}

#[test]
fn test_published_state_contents() {
    let mut game = Game::new(64);
    let image = load(&game.sample.archive());
    let mut scope = Scope::init(&image, None, 4096).unwrap();

    tick(&mut scope, &mut game, 3);
    tick(&mut scope, &mut game, 4);

    assert_eq!(
        game.dump(&scope),
        "{score: 7, name: \"ada\", scores: [3, 7], texture: <Texture #1>, \
         shapes: [Box(7, 2), Named(\"ada\"), Empty]}"
    );
    assert!(scope.used_handles().get_as::<Texture>(Handle::from_raw(1)).is_some());
}

#[test]
fn test_old_states_become_stale() {
    let image = load(&counter_archive());
    let mut scope = Scope::init(&image, None, 1024).unwrap();
    let params = counter_params(1, 0);
    let first = *scope.execute(&mut Counter, &counter_info(&params)).unwrap();
    scope.execute(&mut Counter, &counter_info(&params)).unwrap();

    assert_eq!(scope.state_octets(&first), Err(ScopeError::StaleState));
    assert!(scope.state_octets(scope.last_state()).is_ok());
}

#[test]
fn test_states_only_read_in_their_own_scope() {
    let image = load(&counter_archive());
    let mut first = Scope::init(&image, None, 1024).unwrap();
    let mut second = Scope::init(&image, None, 1024).unwrap();
    let params = counter_params(111, 0);
    let first_state = *first.execute(&mut Counter, &counter_info(&params)).unwrap();
    let params = counter_params(7, 0);
    second.execute(&mut Counter, &counter_info(&params)).unwrap();

    // Same slot, same epoch, different arena.
    assert_eq!(first_state.slot(), second.last_state().slot());
    assert_eq!(first_state.epoch(), second.last_state().epoch());
    assert_eq!(second.state_octets(&first_state), Err(ScopeError::StaleState));
    let mut out = String::new();
    assert_eq!(
        second.write_state(&first_state, &mut out),
        Err(ScopeError::StaleState)
    );

    drop(first);
    assert_eq!(second.state_octets(&first_state), Err(ScopeError::StaleState));
    assert_eq!(second.state_octets(second.last_state()).unwrap(), &7i32.to_ne_bytes());
}

#[test]
fn test_copy_state_from_retires_earlier_states() {
    let image = load(&counter_archive());
    let mut source = Scope::init(&image, None, 1024).unwrap();
    let params = counter_params(3, 0);
    source.execute(&mut Counter, &counter_info(&params)).unwrap();

    let mut target = Scope::init(&image, None, 1024).unwrap();
    let invoked = target.invoke(&mut Counter, "main", &counter_params(9, 0), 2).unwrap();
    assert_eq!(target.state_octets(&invoked).unwrap(), &9i32.to_ne_bytes());

    target.copy_state_from(&source).unwrap();
    assert_eq!(invoked.slot(), target.last_state().slot());
    assert_eq!(invoked.epoch(), target.last_state().epoch());
    assert_eq!(target.state_octets(&invoked), Err(ScopeError::StaleState));
    assert_eq!(target.state_octets(target.last_state()).unwrap(), &3i32.to_ne_bytes());
}

#[test]
fn test_clear() {
    let mut game = Game::new(16);
    let image = load(&game.sample.archive());
    let mut scope = Scope::init(&image, None, 4096).unwrap();
    tick(&mut scope, &mut game, 1);
    let published = *scope.last_state();

    scope.clear();

    assert_eq!(scope.active_slot(), 0);
    assert!(scope.last_state().is_empty());
    assert_eq!(scope.used_memory().used(), 0);
    assert!(scope.used_handles().is_empty());
    assert!(scope.next_handles().is_empty());
    assert_eq!(scope.state_octets(&published), Err(ScopeError::StaleState));
    assert_eq!(scope.state_octets(&State::EMPTY), Err(ScopeError::EmptyState));

    tick(&mut scope, &mut game, 2);
    assert_eq!(scope.active_slot(), 1);
    assert!(game.dump(&scope).starts_with("{score: 2,"));
}

#[test]
fn test_compaction_disabled() {
    let image = load(&counter_archive());
    let mut scope = Scope::init(&image, None, 1024).unwrap();
    scope.set_compaction(false);
    assert!(!scope.is_compacting());

    let params = counter_params(1, 0);
    let state = *scope.execute(&mut Counter, &counter_info(&params)).unwrap();

    assert_eq!(scope.active_slot(), 1);
    assert_eq!(state.slot(), 0);
    assert_eq!(state.octet_count(), 4);
    assert_eq!(scope.state_octets(&state), Err(ScopeError::StaleState));
    assert_eq!(scope.used_memory().used(), 0);
}

#[test]
fn test_collect_failure_keeps_last_state() {
    let mut game = Game::new(0);
    let image = load(&game.sample.archive());
    let mut scope = Scope::init(&image, None, 4096).unwrap();
    tick(&mut scope, &mut game, 1);
    let before = *scope.last_state();
    let rendered = game.dump(&scope);

    game.corrupt = true;
    let params = game.params(&scope, 1);
    let info = game.info(&params);
    let err = scope.execute(&mut game, &info).unwrap_err();

    assert_eq!(
        err,
        ScopeError::Collect(CollectError::InvalidTag {
            ty: game.sample.shape,
            tag: 9
        })
    );
    assert_eq!(*scope.last_state(), before);
    assert_eq!(scope.active_slot(), 1);
    assert_eq!(game.dump(&scope), rendered);
    assert!(scope.next_handles().is_empty());
}

#[test]
fn test_run_error() {
    struct Failing;
    impl Interpreter for Failing {
        fn run(&mut self, _: &mut Machine<'_>, _: &Function, _: Parameters<'_>) -> Result<(), RunError> {
            Err(RunError::trap("division by zero"))
        }
    }

    let image = load(&counter_archive());
    let mut scope = Scope::init(&image, None, 1024).unwrap();
    let params = counter_params(1, 0);

    let err = scope.execute(&mut Failing, &counter_info(&params)).unwrap_err();
    assert_eq!(err, ScopeError::Run(RunError::trap("division by zero")));
    assert!(scope.last_state().is_empty());
    assert_eq!(scope.active_slot(), 0);
}

#[test]
fn test_fork_is_independent() {
    let mut game = Game::new(32);
    let image = load(&game.sample.archive());
    let mut scope = Scope::init(&image, None, 4096).unwrap();
    tick(&mut scope, &mut game, 1);
    tick(&mut scope, &mut game, 2);
    let original = game.dump(&scope);

    let mut fork = scope.fork().unwrap();
    assert_eq!(game.dump(&fork), original);
    assert_eq!(fork.used_handles().len(), 1);
    assert_eq!(fork.ram_memory_size(), 4096);

    tick(&mut scope, &mut game, 10);
    assert_eq!(game.dump(&fork), original);

    tick(&mut fork, &mut game, 100);
    assert!(game.dump(&fork).starts_with("{score: 103, name: \"ada\", scores: [1, 3, 103]"));
    assert!(game.dump(&scope).starts_with("{score: 13, name: \"ada\", scores: [1, 3, 13]"));

    drop(scope);
    assert!(game.dump(&fork).starts_with("{score: 103,"));
}

#[test]
fn test_copy_state_from_takes_source_settings() {
    let mut game = Game::new(0);
    let image = load(&game.sample.archive());
    let mut source = Scope::with_options(
        &image,
        ScopeOptions {
            ram_memory_size: 8192,
            verbose: true,
            predicting: true,
            ..ScopeOptions::default()
        },
    )
    .unwrap();
    tick(&mut source, &mut game, 5);

    let mut target = Scope::init(&image, None, 1024).unwrap();
    target.copy_state_from(&source).unwrap();

    assert_eq!(target.ram_memory_size(), 8192);
    assert!(target.context().flags().verbose);
    assert!(target.context().flags().predicting);
    assert_eq!(target.active_slot(), 0);
    assert_eq!(target.last_state().slot(), 0);
    assert_eq!(game.dump(&target), game.dump(&source));
}

#[test]
fn test_copy_from_empty_source() {
    let image = load(&counter_archive());
    let source = Scope::init(&image, None, 1024).unwrap();
    let mut target = Scope::init(&image, None, 1024).unwrap();

    assert_eq!(target.copy_state_from(&source), Err(ScopeError::EmptyState));
    assert!(target.last_state().is_empty());
    assert!(source.fork().is_err());
}

#[test]
fn test_invoke() {
    let mut game = Game::new(0);
    let image = load(&game.sample.archive());
    let mut scope = Scope::init(&image, None, 4096).unwrap();
    tick(&mut scope, &mut game, 2);

    let params = game.params(&scope, 40);
    let result = scope.invoke(&mut game, "reset", &params, 2).unwrap();
    assert_eq!(result.slot(), scope.active_slot());
    assert_eq!(result.octet_count(), game.sample.state_size());
    let mut out = String::new();
    scope.write_state(&result, &mut out).unwrap();
    assert!(out.starts_with("{score: 42,"));
    // Invoking does not publish anything.
    assert!(game.dump(&scope).starts_with("{score: 2,"));

    tick(&mut scope, &mut game, 1);
    assert_eq!(scope.state_octets(&result), Err(ScopeError::StaleState));

    assert_eq!(
        scope.invoke(&mut game, "missing", &params, 2).unwrap_err(),
        ScopeError::UnknownFunction {
            name: "missing".into()
        }
    );
}

#[test]
fn test_user_data_reaches_interpreter() {
    struct ReadUserData;
    impl Interpreter for ReadUserData {
        fn run(&mut self, machine: &mut Machine<'_>, _: &Function, _: Parameters<'_>) -> Result<(), RunError> {
            let value = *machine.user_data_as::<i32>().ok_or_else(|| RunError::trap("no user data"))?;
            unsafe { raw::write_i32(machine.bp().as_ptr(), value) };
            Ok(())
        }
    }

    let image = load(&counter_archive());
    let user_data: UserData = Arc::new(77i32);
    let mut scope = Scope::init(&image, Some(user_data), 1024).unwrap();
    let params = counter_params(0, 0);
    let state = *scope.execute(&mut ReadUserData, &counter_info(&params)).unwrap();

    assert_eq!(scope.state_octets(&state).unwrap(), &77i32.to_ne_bytes());
}

#[test]
fn test_image_must_be_ready() {
    let image = ProgramImage::new(no_externals);
    assert_eq!(Scope::init(&image, None, 1024).unwrap_err(), ScopeError::NotReady);
}

#[test]
fn test_accessors() {
    let mut archive = counter_archive();
    archive.resource_names = Some(vec!["hero.png".into()]);
    let image = load(&archive);
    let mut scope = Scope::init(&image, None, 2048).unwrap();

    assert_eq!(scope.resource_names().get(0), Some("hero.png"));
    assert_eq!(scope.find_function("main").unwrap().name, "main");
    assert!(scope.find_function("draw").is_none());
    assert_eq!(scope.image().debug_name(), "scope");
    assert_eq!(scope.used_memory().capacity(), 2048);

    scope.set_verbose(true);
    scope.set_predicting(true);
    assert!(scope.context().flags().verbose);
    assert!(scope.context().flags().predicting);
}
