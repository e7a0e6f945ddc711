use std::{cell::RefCell, io::Write, rc::Rc};

use rustc_hash::FxHashMap;

use crate::interpreter::{ExecutionErrorKind, NativeFunction, Value, MAX_SEQUENCE_LEN};

/// The functions every program starts with. `print` writes to `stdout`.
pub fn standard(stdout: Rc<RefCell<dyn Write>>) -> Vec<NativeFunction> {
    vec![print(stdout), len(), range()]
}

fn native_error(function: &str, message: impl Into<String>) -> ExecutionErrorKind {
    ExecutionErrorKind::Native {
        function: function.to_string(),
        message: message.into(),
    }
}

fn reject_keywords(
    function: &str,
    kwargs: &FxHashMap<String, Value>,
) -> Result<(), ExecutionErrorKind> {
    match kwargs.keys().next() {
        Some(keyword) => Err(ExecutionErrorKind::UnexpectedKeyword {
            function: function.to_string(),
            keyword: keyword.clone(),
        }),
        None => Ok(()),
    }
}

fn string_keyword(
    kwargs: &mut FxHashMap<String, Value>,
    name: &str,
    default: &str,
) -> Result<String, ExecutionErrorKind> {
    match kwargs.remove(name) {
        None => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Null) => Ok(default.to_string()),
        Some(other) => Err(native_error(
            "print",
            format!("{} must be a string, not {}", name, other.type_name()),
        )),
    }
}

fn print(stdout: Rc<RefCell<dyn Write>>) -> NativeFunction {
    NativeFunction::new("print", move |args, mut kwargs| {
        let sep = string_keyword(&mut kwargs, "sep", " ")?;
        let end = string_keyword(&mut kwargs, "end", "\n")?;
        reject_keywords("print", &kwargs)?;

        let line = args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(&sep);
        write!(stdout.borrow_mut(), "{}{}", line, end)?;
        Ok(Value::Void)
    })
}

fn len() -> NativeFunction {
    NativeFunction::new("len", |args, kwargs| {
        reject_keywords("len", &kwargs)?;
        let [value] = <[Value; 1]>::try_from(args).map_err(|args| {
            ExecutionErrorKind::InvalidFunctionCall {
                name: "len".to_string(),
                given: args.len(),
                expected: 1,
            }
        })?;

        let length = match &value {
            Value::String(s) => s.chars().count(),
            Value::List(items) => items.borrow().len(),
            Value::Dictionary(dict) => dict.borrow().len(),
            other => {
                return Err(native_error(
                    "len",
                    format!("{} has no length", other.type_name()),
                ))
            }
        };
        i64::try_from(length)
            .map(Value::Integer)
            .map_err(|_| native_error("len", "length does not fit in an integer"))
    })
}

fn range() -> NativeFunction {
    NativeFunction::new("range", |args, kwargs| {
        reject_keywords("range", &kwargs)?;
        let bounds = args
            .iter()
            .map(|arg| match arg {
                Value::Integer(n) => Ok(*n),
                other => Err(native_error(
                    "range",
                    format!("bounds must be integers, not {}", other.type_name()),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (start, stop) = match bounds[..] {
            [stop] => (0, stop),
            [start, stop] => (start, stop),
            _ => {
                return Err(ExecutionErrorKind::InvalidFunctionCall {
                    name: "range".to_string(),
                    given: bounds.len(),
                    expected: 2,
                })
            }
        };
        let len = (i128::from(stop) - i128::from(start)).max(0);
        if len > MAX_SEQUENCE_LEN as i128 {
            return Err(ExecutionErrorKind::SequenceTooLong);
        }
        Ok(Value::list((start..stop).map(Value::Integer).collect()))
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn call(
        native: &NativeFunction,
        args: Vec<Value>,
        kwargs: &[(&str, Value)],
    ) -> Result<Value, ExecutionErrorKind> {
        native.call(
            args,
            kwargs
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_print_separators() {
        let output = Rc::new(RefCell::new(Vec::<u8>::new()));
        let print = print(output.clone());

        call(&print, vec![Value::Integer(1), Value::String("a".into())], &[]).unwrap();
        call(
            &print,
            vec![Value::Integer(1), Value::Integer(2)],
            &[("sep", Value::String("-".into())), ("end", Value::String("!".into()))],
        )
        .unwrap();
        call(&print, vec![], &[]).unwrap();

        assert_eq!(String::from_utf8(output.take()).unwrap(), "1 a\n1-2!\n");
    }

    #[test]
    fn test_print_rejects_unknown_keyword() {
        let print = print(Rc::new(RefCell::new(Vec::<u8>::new())));
        assert!(matches!(
            call(&print, vec![], &[("file", Value::Null)]),
            Err(ExecutionErrorKind::UnexpectedKeyword { .. })
        ));
    }

    #[test]
    fn test_len() {
        let len = len();
        assert!(matches!(
            call(&len, vec![Value::String("héllo".into())], &[]),
            Ok(Value::Integer(5))
        ));
        assert!(matches!(
            call(&len, vec![Value::list(vec![Value::Null])], &[]),
            Ok(Value::Integer(1))
        ));
        assert!(call(&len, vec![Value::Integer(3)], &[]).is_err());
    }

    #[test]
    fn test_range() {
        let range = range();
        assert_eq!(
            call(&range, vec![Value::Integer(3)], &[]).unwrap().to_string(),
            "[0, 1, 2]"
        );
        assert_eq!(
            call(&range, vec![Value::Integer(2), Value::Integer(4)], &[])
                .unwrap()
                .to_string(),
            "[2, 3]"
        );
        assert_eq!(
            call(&range, vec![Value::Integer(5), Value::Integer(1)], &[])
                .unwrap()
                .to_string(),
            "[]"
        );
        assert!(call(&range, vec![], &[]).is_err());
        assert!(matches!(
            call(&range, vec![Value::Integer(0), Value::Integer(i64::MAX)], &[]),
            Err(ExecutionErrorKind::SequenceTooLong)
        ));
        assert!(matches!(
            call(&range, vec![Value::Integer(i64::MIN), Value::Integer(i64::MAX)], &[]),
            Err(ExecutionErrorKind::SequenceTooLong)
        ));
    }
}
