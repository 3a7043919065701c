slint::include_modules!();

puzzle_runtime::puzzle_main!(PuzzleWindow);
