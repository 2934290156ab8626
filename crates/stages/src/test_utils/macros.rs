macro_rules! stage_test_suite {
    ($runner:ident) => {
        /// Check that the execution is a no-op if the database is empty.
        #[test]
        fn execute_empty_db() {
            let runner = $runner::default();
            let input = crate::test_utils::ExecInput::default();
            let result = runner.execute(input);
            assert_matches::assert_matches!(result, Ok(0));
            assert!(runner.validate_execution(input, result.ok()).is_ok(), "execution validation");
        }

        /// Check that the execution is short-circuited if the target was already reached.
        #[test]
        fn execute_already_reached_target() {
            let stage_progress = 50;
            let mut runner = $runner::default();
            let input = crate::test_utils::ExecInput { stage_progress, target: stage_progress };
            runner.seed_execution(input).expect("failed to seed");
            let result = runner.execute(input);
            assert_matches::assert_matches!(result, Ok(progress) if progress == stage_progress);
            assert!(runner.validate_execution(input, result.ok()).is_ok(), "execution validation");

            // running again changes nothing
            let result = runner.execute(input);
            assert_matches::assert_matches!(result, Ok(progress) if progress == stage_progress);
        }

        #[test]
        fn execute() {
            let (target, stage_progress) = (50, 10);
            let mut runner = $runner::default();
            let input = crate::test_utils::ExecInput { stage_progress, target };
            runner.seed_execution(input).expect("failed to seed");
            let result = runner.execute(input);
            assert_matches::assert_matches!(result, Ok(progress) if progress == target);
            assert!(runner.validate_execution(input, result.ok()).is_ok(), "execution validation");
        }

        /// Check that unwind does not panic on empty database.
        #[test]
        fn unwind_empty_db() {
            let runner = $runner::default();
            let input = crate::test_utils::UnwindInput::default();
            let result = runner.unwind(input);
            assert_matches::assert_matches!(
                result,
                Ok(progress) if progress == input.unwind_to
            );
            assert!(runner.validate_unwind(input).is_ok(), "unwind validation");
        }

        #[test]
        fn unwind() {
            let (target, stage_progress) = (50, 10);
            let mut runner = $runner::default();

            // Run execute
            let execute_input = crate::test_utils::ExecInput { stage_progress, target };
            runner.seed_execution(execute_input).expect("failed to seed");
            let result = runner.execute(execute_input);
            assert_matches::assert_matches!(result, Ok(progress) if progress == target);
            assert!(
                runner.validate_execution(execute_input, result.ok()).is_ok(),
                "execution validation"
            );

            let unwind_input =
                crate::test_utils::UnwindInput { stage_progress: target, unwind_to: stage_progress };
            let result = runner.unwind(unwind_input);
            assert_matches::assert_matches!(
                result,
                Ok(progress) if progress == unwind_input.unwind_to
            );
            assert!(runner.validate_unwind(unwind_input).is_ok(), "unwind validation");
        }
    };
}

pub(crate) use stage_test_suite;
