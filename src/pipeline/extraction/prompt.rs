//! Prompts for turning raw OCR text into one structured patient record.

pub const SYSTEM_PROMPT: &str = "\
You are a data-extraction assistant for a Brazilian dental clinic. You read \
the raw OCR text of a patient intake form (ficha de paciente) and return the \
patient's registration data as a single JSON object. Respond with JSON only, \
no commentary.";

/// Build the user message for one document's OCR text.
///
/// The model must return exactly the listed camelCase keys, with null for
/// anything not present in the document. Inventing values is the main
/// failure mode of this stage, so the instruction forbids it explicitly.
pub fn build_extraction_prompt(ocr_text: &str) -> String {
    format!(
        "Extract the patient registration data from the OCR text below.\n\
         \n\
         Return a JSON object with exactly these keys:\n\
         - \"fullName\": patient's full name (nome / nome completo)\n\
         - \"phone\": landline phone (telefone / telefone fixo)\n\
         - \"cellphone\": mobile phone (celular)\n\
         - \"email\": e-mail address\n\
         - \"cpf\": CPF number, digits and punctuation as written\n\
         - \"birthDate\": birth date (data de nascimento) as written\n\
         - \"address\": street address (endereço / logradouro), with number\n\
         - \"city\": city (cidade)\n\
         - \"state\": state abbreviation (UF / estado)\n\
         - \"cep\": postal code (CEP)\n\
         - \"neighborhood\": neighborhood (bairro)\n\
         \n\
         Rules:\n\
         - Use null for any field that is not present in the text.\n\
         - Never invent or guess values. Never copy example values.\n\
         - Copy values exactly as written, including accents.\n\
         \n\
         OCR text:\n\
         ---\n\
         {ocr_text}\n\
         ---"
    )
}
