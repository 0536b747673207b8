use tracing::error;

use crate::convert::Converter;
use crate::error::{Abc2AsmError, Result};
use crate::file::{AbcFile, EntityId};
use crate::program::{Annotation, AnnotationElement, Function, ScalarValue};

pub const SLOT_NUMBER_ANNOTATION: &str = "_ESSlotNumberAnnotation";
pub const SLOT_NUMBER_ELEMENT: &str = "SlotNumber";
pub const CONCURRENT_MODULE_REQUESTS_ANNOTATION: &str = "_ESConcurrentModuleRequestsAnnotation";

impl<F: AbcFile> Converter<'_, F> {
    /// Decodes one annotation. Literal-array elements are registered under
    /// `owner`.
    pub(crate) fn decode_annotation(&mut self, id: EntityId, owner: &str) -> Result<Annotation> {
        let file = self.file;
        let data = file.annotation(id)?;
        let name = self.names.record_name(file, data.class_id)?;

        let mut elements = Vec::with_capacity(data.elements.len());
        for (i, element) in data.elements.iter().enumerate() {
            let Some(&tag) = data.tags.get(i) else {
                error!(
                    annotation = name,
                    index = i,
                    tags = data.tags.len(),
                    "annotation element has no tag"
                );
                continue;
            };
            let value = match tag {
                b'1' => ScalarValue::U1(element.value != 0),
                b'7' => ScalarValue::U32(element.value),
                b'B' => ScalarValue::F64(file.f64_at(EntityId(element.value))?),
                b'C' => ScalarValue::Str(self.names.string_of(file, EntityId(element.value))?),
                b'#' => {
                    let id = EntityId(element.value);
                    ScalarValue::LiteralArray(self.register_literal_array(id, owner))
                }
                other => return Err(Abc2AsmError::UnsupportedAnnotationTag(other as char)),
            };
            elements.push(AnnotationElement {
                name: file.string_data(element.name_id)?,
                value,
            });
        }
        Ok(Annotation { name, elements })
    }

    pub(crate) fn record_annotations(
        &mut self,
        ids: &[EntityId],
        owner: &str,
    ) -> Result<Vec<Annotation>> {
        ids.iter().map(|&id| self.decode_annotation(id, owner)).collect()
    }

    /// Decodes a method's annotations onto `function`; the slot-number and
    /// concurrent-request annotations become function properties.
    pub(crate) fn annotate_function(
        &mut self,
        function: &mut Function,
        ids: &[EntityId],
        owner: &str,
    ) -> Result<()> {
        for &id in ids {
            let annotation = self.decode_annotation(id, owner)?;
            match annotation.name.as_str() {
                SLOT_NUMBER_ANNOTATION => {
                    function.slots_num = annotation.elements.iter().find_map(|e| match e.value {
                        ScalarValue::U32(n) if e.name == SLOT_NUMBER_ELEMENT => Some(n),
                        _ => None,
                    });
                }
                CONCURRENT_MODULE_REQUESTS_ANNOTATION => {
                    let requests = annotation
                        .elements
                        .iter()
                        .filter_map(|e| match e.value {
                            ScalarValue::U32(n) => Some(n),
                            _ => None,
                        })
                        .collect();
                    function.concurrent_module_requests = Some(requests);
                }
                _ => function.annotations.push(annotation),
            }
        }
        Ok(())
    }
}
