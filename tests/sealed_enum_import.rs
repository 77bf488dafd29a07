//! spec.md §8 scenario 5: sealed enum import. Enum `E` sealed with permit
//! `beta`; importing it from package `main` fails with an access error
//! containing "cannot import sealed enum E".

use std::fs;

use polyloft::Interpreter;

#[test]
fn importing_sealed_enum_outside_permits_is_rejected() {
    let dir = std::env::temp_dir().join(format!(
        "polyloft-sealed-enum-{}",
        std::process::id()
    ));
    let alpha_dir = dir.join("alpha");
    fs::create_dir_all(&alpha_dir).expect("create alpha dir");

    fs::write(
        alpha_dir.join("e.pf"),
        r#"
        sealed enum E permits beta {
            A;
        }
        "#,
    )
    .expect("write e.pf");

    let main_file = dir.join("main.pf");
    fs::write(
        &main_file,
        r#"
        import { E } from "alpha.e";
        E.A;
        "#,
    )
    .expect("write main.pf");

    let source = fs::read_to_string(&main_file).expect("read main.pf");
    let mut interpreter = Interpreter::new();
    let result = interpreter.eval_source(&main_file.to_string_lossy(), &source);

    fs::remove_dir_all(&dir).ok();

    let exc = result.expect_err("expected sealed enum import to be rejected");
    assert!(
        exc.message.contains("cannot import sealed enum E"),
        "unexpected message: {}",
        exc.message
    );
}
