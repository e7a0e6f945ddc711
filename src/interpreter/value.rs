use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    rc::Rc,
};

use rustc_hash::FxHashMap;

use crate::ast::{format_float, Operator};

use super::{
    callable::{Function, NativeFunction},
    class::{Class, Instance},
    ExecutionErrorKind,
};

/// Upper bound on the length of a list built by repetition, concatenation
/// or `range`, and on the byte length of a repeated or joined string.
pub const MAX_SEQUENCE_LEN: usize = 1 << 24;

#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    /// The result of something that produces nothing; never stored.
    Void,
    List(Rc<RefCell<Vec<Value>>>),
    Dictionary(Rc<RefCell<Dictionary>>),
    Function(Rc<Function>),
    NativeFunction(Rc<NativeFunction>),
    ClassDefinition(Rc<Class>),
    ClassInstance(Rc<Instance>),
}

/// The values usable as dictionary keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Integer(i64),
    String(String),
    Boolean(bool),
    Null,
}

impl TryFrom<&Value> for Key {
    type Error = ExecutionErrorKind;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Integer(n) => Ok(Key::Integer(*n)),
            Value::String(s) => Ok(Key::String(s.clone())),
            Value::Boolean(b) => Ok(Key::Boolean(*b)),
            Value::Null => Ok(Key::Null),
            other => Err(ExecutionErrorKind::UnhashableKey(other.type_name())),
        }
    }
}

impl From<&Key> for Value {
    fn from(key: &Key) -> Self {
        match key {
            Key::Integer(n) => Value::Integer(*n),
            Key::String(s) => Value::String(s.clone()),
            Key::Boolean(b) => Value::Boolean(*b),
            Key::Null => Value::Null,
        }
    }
}

/// Insertion-ordered mapping.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    indices: FxHashMap<Key, usize>,
    entries: Vec<(Key, Value)>,
}

impl Dictionary {
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.indices.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn insert(&mut self, key: Key, value: Value) {
        match self.indices.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.indices.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Null => "null",
            Value::Void => "void",
            Value::List(_) => "list",
            Value::Dictionary(_) => "dictionary",
            Value::Function(_) => "function",
            Value::NativeFunction(_) => "native function",
            Value::ClassDefinition(_) => "class",
            Value::ClassInstance(_) => "instance",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Void => false,
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Dictionary(dict) => !dict.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn equals(&self, other: &Value) -> bool {
        self.equals_within(other, &mut Vec::new())
    }

    /// `active` holds the container pairs already being compared further up.
    /// Meeting one again means the two structures cycle in step, and nothing
    /// found so far tells them apart.
    fn equals_within(&self, other: &Value, active: &mut Vec<(*const (), *const ())>) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) | (Value::Void, Value::Void) => true,
            (Value::List(a), Value::List(b)) => {
                let pair = (Rc::as_ptr(a).cast::<()>(), Rc::as_ptr(b).cast::<()>());
                if Rc::ptr_eq(a, b) || active.contains(&pair) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                active.push(pair);
                let equal = a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(a, b)| a.equals_within(b, active));
                active.pop();
                equal
            }
            (Value::Dictionary(a), Value::Dictionary(b)) => {
                let pair = (Rc::as_ptr(a).cast::<()>(), Rc::as_ptr(b).cast::<()>());
                if Rc::ptr_eq(a, b) || active.contains(&pair) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                active.push(pair);
                let equal = a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.get(key)
                            .is_some_and(|other| value.equals_within(other, active))
                    });
                active.pop();
                equal
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::NativeFunction(a), Value::NativeFunction(b)) => Rc::ptr_eq(a, b),
            (Value::ClassDefinition(a), Value::ClassDefinition(b)) => Rc::ptr_eq(a, b),
            (Value::ClassInstance(a), Value::ClassInstance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Evaluates one relation of a comparison chain.
    pub fn compare(&self, op: Operator, other: &Value) -> Result<bool, ExecutionErrorKind> {
        let ordering = match op {
            Operator::Eq => return Ok(self.equals(other)),
            Operator::NotEq => return Ok(!self.equals(other)),
            _ => match (self, other) {
                (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
                (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
                (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
                (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => return Err(self.invalid_operands(op, other)),
            },
        };

        // NaN compares false under every ordering operator.
        let Some(ordering) = ordering else {
            return Ok(false);
        };
        Ok(match op {
            Operator::Lt => ordering.is_lt(),
            Operator::LtE => ordering.is_le(),
            Operator::Gt => ordering.is_gt(),
            Operator::GtE => ordering.is_ge(),
            _ => return Err(self.invalid_operands(op, other)),
        })
    }

    pub fn arithmetic(&self, op: Operator, other: &Value) -> Result<Value, ExecutionErrorKind> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => integer_arithmetic(op, *a, *b),
            (Value::Integer(a), Value::Float(b)) => float_arithmetic(op, *a as f64, *b),
            (Value::Float(a), Value::Integer(b)) => float_arithmetic(op, *a, *b as f64),
            (Value::Float(a), Value::Float(b)) => float_arithmetic(op, *a, *b),
            (Value::String(a), Value::String(b)) if op == Operator::Add => {
                checked_len(a.len().checked_add(b.len()))?;
                Ok(Value::String(format!("{}{}", a, b)))
            }
            (Value::List(a), Value::List(b)) if op == Operator::Add => {
                let (a, b) = (a.borrow(), b.borrow());
                let mut items = Vec::with_capacity(checked_len(a.len().checked_add(b.len()))?);
                items.extend(a.iter().cloned());
                items.extend(b.iter().cloned());
                Ok(Value::list(items))
            }
            (Value::String(s), Value::Integer(n)) | (Value::Integer(n), Value::String(s))
                if op == Operator::Multiply =>
            {
                let count = repeat_count(*n)?;
                checked_len(s.len().checked_mul(count))?;
                Ok(Value::String(s.repeat(count)))
            }
            (Value::List(items), Value::Integer(n)) | (Value::Integer(n), Value::List(items))
                if op == Operator::Multiply =>
            {
                let count = repeat_count(*n)?;
                let items = items.borrow();
                let len = checked_len(items.len().checked_mul(count))?;
                let repeated = items.iter().cloned().cycle().take(len).collect();
                Ok(Value::list(repeated))
            }
            _ => Err(self.invalid_operands(op, other)),
        }
    }

    pub fn negate(&self) -> Result<Value, ExecutionErrorKind> {
        match self {
            Value::Integer(n) => n
                .checked_neg()
                .map(Value::Integer)
                .ok_or(ExecutionErrorKind::IntegerOverflow(Operator::Subtract)),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(ExecutionErrorKind::InvalidNegate(other.type_name())),
        }
    }

    pub fn index(&self, key: &Value) -> Result<Value, ExecutionErrorKind> {
        match self {
            Value::List(items) => {
                let items = items.borrow();
                let i = resolve_index(key, items.len())?;
                Ok(items[i].clone())
            }
            Value::String(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = resolve_index(key, chars.len())?;
                Ok(Value::String(chars[i].to_string()))
            }
            Value::Dictionary(dict) => {
                let key = Key::try_from(key)?;
                dict.borrow()
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| ExecutionErrorKind::MissingKey(Value::from(&key).repr()))
            }
            other => Err(ExecutionErrorKind::NotIndexable(other.type_name())),
        }
    }

    pub fn set_index(&self, key: &Value, value: Value) -> Result<(), ExecutionErrorKind> {
        if matches!(value, Value::Void) {
            return Err(ExecutionErrorKind::VoidAssignment(format!(
                "{}[{}]",
                self.type_name(),
                key.repr()
            )));
        }
        match self {
            Value::List(items) => {
                let mut items = items.borrow_mut();
                let i = resolve_index(key, items.len())?;
                items[i] = value;
                Ok(())
            }
            Value::Dictionary(dict) => {
                dict.borrow_mut().insert(Key::try_from(key)?, value);
                Ok(())
            }
            other => Err(ExecutionErrorKind::NotIndexable(other.type_name())),
        }
    }

    /// The elements a `for` loop visits, collected up front.
    pub fn iterate(&self) -> Result<Vec<Value>, ExecutionErrorKind> {
        match self {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
            Value::Dictionary(dict) => Ok(dict.borrow().iter().map(|(k, _)| Value::from(k)).collect()),
            other => Err(ExecutionErrorKind::NotIterable(other.type_name())),
        }
    }

    /// Source-like rendering, used for elements inside containers.
    pub fn repr(&self) -> String {
        Repr(self).to_string()
    }

    /// Writes `self`, quoting strings when `quoted`. A container that is
    /// already in `active` is being written further up and prints as `[...]`
    /// or `{...}`.
    fn write_to(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        quoted: bool,
        active: &mut Vec<*const ()>,
    ) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", format_float(*n)),
            Value::String(s) if !quoted => write!(f, "{}", s),
            Value::String(s) if s.contains('\'') => write!(f, "\"{}\"", s),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::Void => write!(f, "void"),
            Value::List(items) => {
                let id = Rc::as_ptr(items).cast::<()>();
                if active.contains(&id) {
                    return write!(f, "[...]");
                }
                active.push(id);
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    item.write_to(f, true, active)?;
                }
                active.pop();
                write!(f, "]")
            }
            Value::Dictionary(dict) => {
                let id = Rc::as_ptr(dict).cast::<()>();
                if active.contains(&id) {
                    return write!(f, "{{...}}");
                }
                active.push(id);
                write!(f, "{{")?;
                for (i, (key, value)) in dict.borrow().iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    Value::from(key).write_to(f, true, active)?;
                    write!(f, ": ")?;
                    value.write_to(f, true, active)?;
                }
                active.pop();
                write!(f, "}}")
            }
            Value::Function(function) => write!(f, "<function {}>", function.name),
            Value::NativeFunction(native) => write!(f, "<native function {}>", native.name),
            Value::ClassDefinition(class) => write!(f, "<class {}>", class.name),
            Value::ClassInstance(instance) => {
                write!(f, "<instance of {}>", instance.class.name)
            }
        }
    }

    fn invalid_operands(&self, op: Operator, other: &Value) -> ExecutionErrorKind {
        ExecutionErrorKind::InvalidOperands {
            op,
            left: self.type_name(),
            right: other.type_name(),
        }
    }
}

fn integer_arithmetic(op: Operator, a: i64, b: i64) -> Result<Value, ExecutionErrorKind> {
    let result = match op {
        Operator::Add => a.checked_add(b),
        Operator::Subtract => a.checked_sub(b),
        Operator::Multiply => a.checked_mul(b),
        Operator::Divide => {
            if b == 0 {
                return Err(ExecutionErrorKind::DivisionByZero);
            }
            a.checked_div(b)
        }
        _ => {
            return Err(ExecutionErrorKind::InvalidOperands {
                op,
                left: "integer",
                right: "integer",
            })
        }
    };
    result
        .map(Value::Integer)
        .ok_or(ExecutionErrorKind::IntegerOverflow(op))
}

fn float_arithmetic(op: Operator, a: f64, b: f64) -> Result<Value, ExecutionErrorKind> {
    Ok(Value::Float(match op {
        Operator::Add => a + b,
        Operator::Subtract => a - b,
        Operator::Multiply => a * b,
        Operator::Divide => a / b,
        _ => {
            return Err(ExecutionErrorKind::InvalidOperands {
                op,
                left: "float",
                right: "float",
            })
        }
    }))
}

fn repeat_count(n: i64) -> Result<usize, ExecutionErrorKind> {
    usize::try_from(n).map_err(|_| ExecutionErrorKind::NegativeRepeat(n))
}

/// Rejects a result length before anything is allocated for it.
fn checked_len(len: Option<usize>) -> Result<usize, ExecutionErrorKind> {
    len.filter(|&len| len <= MAX_SEQUENCE_LEN)
        .ok_or(ExecutionErrorKind::SequenceTooLong)
}

fn resolve_index(key: &Value, len: usize) -> Result<usize, ExecutionErrorKind> {
    let Value::Integer(index) = key else {
        return Err(ExecutionErrorKind::InvalidIndex(key.type_name()));
    };
    let resolved = if *index < 0 {
        i64::try_from(len).ok().and_then(|len| index.checked_add(len))
    } else {
        Some(*index)
    };
    resolved
        .and_then(|i| usize::try_from(i).ok())
        .filter(|&i| i < len)
        .ok_or(ExecutionErrorKind::IndexOutOfRange { index: *index, len })
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_to(f, false, &mut Vec::new())
    }
}

struct Repr<'a>(&'a Value);

impl Display for Repr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.write_to(f, true, &mut Vec::new())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn list(items: Vec<Value>) -> Value {
        Value::list(items)
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!list(vec![]).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Void.is_truthy());
        assert!(Value::Integer(-1).is_truthy());
        assert!(list(vec![Value::Null]).is_truthy());
    }

    #[test]
    fn test_integer_arithmetic() {
        let seven = Value::Integer(7);
        let two = Value::Integer(2);
        assert!(matches!(seven.arithmetic(Operator::Divide, &two), Ok(Value::Integer(3))));
        assert!(matches!(
            Value::Integer(-7).arithmetic(Operator::Divide, &two),
            Ok(Value::Integer(-3))
        ));
        assert!(matches!(
            seven.arithmetic(Operator::Divide, &Value::Integer(0)),
            Err(ExecutionErrorKind::DivisionByZero)
        ));
        assert!(matches!(
            Value::Integer(i64::MAX).arithmetic(Operator::Add, &Value::Integer(1)),
            Err(ExecutionErrorKind::IntegerOverflow(Operator::Add))
        ));
    }

    #[test]
    fn test_float_promotion() {
        let result = Value::Integer(1)
            .arithmetic(Operator::Add, &Value::Float(0.5))
            .unwrap();
        assert!(matches!(result, Value::Float(n) if n == 1.5));
        let result = Value::Float(1.0)
            .arithmetic(Operator::Divide, &Value::Integer(0))
            .unwrap();
        assert!(matches!(result, Value::Float(n) if n.is_infinite()));
    }

    #[test]
    fn test_concatenation_and_repetition() {
        let s = Value::String("ab".to_string());
        assert_eq!(
            s.arithmetic(Operator::Multiply, &Value::Integer(3))
                .unwrap()
                .to_string(),
            "ababab"
        );
        let joined = list(vec![Value::Integer(1)])
            .arithmetic(Operator::Add, &list(vec![Value::Integer(2)]))
            .unwrap();
        assert_eq!(joined.to_string(), "[1, 2]");
        assert!(matches!(
            s.arithmetic(Operator::Subtract, &Value::Integer(1)),
            Err(ExecutionErrorKind::InvalidOperands { .. })
        ));
        assert!(matches!(
            s.arithmetic(Operator::Multiply, &Value::Integer(-1)),
            Err(ExecutionErrorKind::NegativeRepeat(-1))
        ));
    }

    #[test]
    fn test_repetition_is_bounded() {
        let one = list(vec![Value::Integer(1)]);
        assert!(matches!(
            one.arithmetic(Operator::Multiply, &Value::Integer(4611686018427387904)),
            Err(ExecutionErrorKind::SequenceTooLong)
        ));
        assert!(matches!(
            Value::String("ab".into()).arithmetic(Operator::Multiply, &Value::Integer(i64::MAX)),
            Err(ExecutionErrorKind::SequenceTooLong)
        ));
        let empty = list(vec![])
            .arithmetic(Operator::Multiply, &Value::Integer(i64::MAX))
            .unwrap();
        assert_eq!(empty.to_string(), "[]");
        assert_eq!(
            one.arithmetic(Operator::Multiply, &Value::Integer(3))
                .unwrap()
                .to_string(),
            "[1, 1, 1]"
        );
    }

    #[test]
    fn test_floats_print_in_decimal() {
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(-0.5).to_string(), "-0.5");
        assert_eq!(Value::Float(0.0000001).to_string(), "0.0000001");
        assert_eq!(
            Value::Float(1e20).to_string(),
            "100000000000000000000.0"
        );
        assert_eq!(Value::Float(f64::INFINITY).to_string(), "inf");
    }

    #[test]
    fn test_comparisons() {
        let one = Value::Integer(1);
        assert!(one.compare(Operator::Eq, &Value::Float(1.0)).unwrap());
        assert!(one.compare(Operator::Lt, &Value::Float(1.5)).unwrap());
        assert!(!one.compare(Operator::Eq, &Value::String("1".into())).unwrap());
        assert!(Value::String("a".into())
            .compare(Operator::Lt, &Value::String("b".into()))
            .unwrap());
        assert!(one.compare(Operator::Lt, &Value::Null).is_err());
        assert!(!Value::Float(f64::NAN)
            .compare(Operator::GtE, &Value::Float(f64::NAN))
            .unwrap());
    }

    #[test]
    fn test_structural_equality() {
        let a = list(vec![Value::Integer(1), Value::String("x".into())]);
        let b = list(vec![Value::Float(1.0), Value::String("x".into())]);
        assert!(a.equals(&b));
        assert!(!a.equals(&list(vec![])));
    }

    #[test]
    fn test_self_referencing_containers() {
        let a = list(vec![Value::Integer(1)]);
        if let Value::List(items) = &a {
            items.borrow_mut().push(a.clone());
        }
        assert_eq!(a.to_string(), "[1, [...]]");

        let b = list(vec![Value::Integer(1)]);
        if let Value::List(items) = &b {
            items.borrow_mut().push(b.clone());
        }
        assert!(a.equals(&b));
        assert!(!a.equals(&list(vec![Value::Integer(1), list(vec![])])));

        let dict = Value::Dictionary(Rc::new(RefCell::new(Dictionary::default())));
        dict.set_index(&Value::String("me".into()), dict.clone())
            .unwrap();
        assert_eq!(dict.to_string(), "{'me': {...}}");
        assert!(dict.equals(&dict.clone()));
    }

    #[test]
    fn test_indexing() {
        let items = list(vec![Value::Integer(10), Value::Integer(20)]);
        assert!(matches!(items.index(&Value::Integer(-1)), Ok(Value::Integer(20))));
        assert!(matches!(
            items.index(&Value::Integer(2)),
            Err(ExecutionErrorKind::IndexOutOfRange { index: 2, len: 2 })
        ));
        items.set_index(&Value::Integer(0), Value::Null).unwrap();
        assert_eq!(items.to_string(), "[null, 20]");

        let s = Value::String("héllo".to_string());
        assert_eq!(s.index(&Value::Integer(1)).unwrap().to_string(), "é");
    }

    #[test]
    fn test_dictionary_keys() {
        let dict = Value::Dictionary(Rc::new(RefCell::new(Dictionary::default())));
        dict.set_index(&Value::String("b".into()), Value::Integer(1))
            .unwrap();
        dict.set_index(&Value::Integer(0), Value::Integer(2)).unwrap();
        dict.set_index(&Value::String("b".into()), Value::Integer(3))
            .unwrap();

        assert_eq!(dict.to_string(), "{'b': 3, 0: 2}");
        assert!(matches!(
            dict.set_index(&Value::Float(1.0), Value::Null),
            Err(ExecutionErrorKind::UnhashableKey("float"))
        ));
        assert!(matches!(
            dict.index(&Value::Null),
            Err(ExecutionErrorKind::MissingKey(_))
        ));
        let keys: Vec<String> = dict
            .iterate()
            .unwrap()
            .iter()
            .map(Value::repr)
            .collect();
        assert_eq!(keys, vec!["'b'", "0"]);
    }

    #[test]
    fn test_iterate_string() {
        let chars: Vec<String> = Value::String("ab".into())
            .iterate()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(chars, vec!["a", "b"]);
        assert!(matches!(
            Value::Integer(3).iterate(),
            Err(ExecutionErrorKind::NotIterable("integer"))
        ));
    }
}
