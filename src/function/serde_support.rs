use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AdError;
use crate::float::Float;
use crate::opcode::OpCode;
use crate::tape::{OperationLog, TapeId};

use super::{Function, FunctionOptions};

impl<F: Float + Serialize> Serialize for Function<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(atom) = self.log.atomics.first() {
            return Err(serde::ser::Error::custom(AdError::AtomicNotSerializable(
                atom.name().to_owned(),
            )));
        }
        let log = &self.log;
        let mut s = serializer.serialize_struct("Function", 8)?;
        s.serialize_field("num_independent", &log.num_independent)?;
        s.serialize_field("opcodes", &log.ops)?;
        s.serialize_field("arg_offsets", &log.arg_offsets)?;
        s.serialize_field("args", &log.args)?;
        s.serialize_field("constants", &log.constants)?;
        s.serialize_field("vectors", &log.vectors)?;
        s.serialize_field("dependents", &self.dependents)?;
        s.serialize_field("options", &self.options)?;
        s.end()
    }
}

impl<'de, F: Float + Deserialize<'de>> Deserialize<'de> for Function<F> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct FunctionData<F> {
            num_independent: u32,
            opcodes: Vec<OpCode>,
            arg_offsets: Vec<u32>,
            args: Vec<u32>,
            constants: Vec<F>,
            #[serde(default)]
            vectors: Vec<Vec<F>>,
            dependents: Vec<u32>,
            #[serde(default)]
            options: FunctionOptions,
        }

        let data = FunctionData::<F>::deserialize(deserializer)?;
        let log = OperationLog {
            id: TapeId::fresh(),
            ops: data.opcodes,
            arg_offsets: data.arg_offsets,
            args: data.args,
            constants: data.constants,
            vectors: data.vectors,
            atomics: Vec::new(),
            num_independent: data.num_independent,
        };
        Function::from_validated(log, data.dependents)
            .map(|f| f.with_options(data.options))
            .map_err(serde::de::Error::custom)
    }
}
