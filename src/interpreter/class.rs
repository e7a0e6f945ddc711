use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::callable::Function;

pub struct Class {
    pub name: String,
    pub methods: FxHashMap<String, Rc<Function>>,
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct Instance {
    pub class: Rc<Class>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .finish()
    }
}
