//! spec.md §8 scenario 3: destructuring a value through the `Unstructured`
//! protocol (`__pieces`/`__getPiece`).

use polyloft::converter::to_display_string;

#[test]
fn destructure_over_unstructured_protocol() {
    let value = test_utils::eval_ok(
        r#"
        class Tuple {
            let a: Any;
            let b: Any;
            let c: Any;
            fn Tuple(a: Any, b: Any, c: Any) {
                this.a = a;
                this.b = b;
                this.c = c;
            }
            fn __pieces(): Int { return 3 }
            fn __getPiece(i: Int): Any {
                if i == 0 { return this.a }
                if i == 1 { return this.b }
                return this.c
            }
        }
        let [a, b, c] = Tuple(1, "two", true);
        [a, b, c];
        "#,
    );
    assert_eq!(to_display_string(&value), "[1, two, true]");
}
