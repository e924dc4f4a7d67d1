// Resume parsing prompt templates.

pub const RESUME_PARSE_SYSTEM: &str = "\
You are an expert resume parsing system. \
Convert resume text into structured JSON. \
You MUST respond with valid JSON only, no markdown fences, no explanations. \
Copy contact details verbatim; never invent an email, phone number or link.";

pub const RESUME_PARSE_PROMPT: &str = r#"Convert the following resume text into a structured JSON object.

RESUME TEXT:
{resume_text}

OUTPUT SCHEMA (return exactly this structure):
{
  "contact": {
    "name": "string" | null,
    "email": "string" | null,
    "phone": "string" | null,
    "linkedin": "string" | null,
    "github": "string" | null,
    "website": "string" | null,
    "location": "string" | null,
    "links": ["string"]
  },
  "summary": "string" | null,
  "experience": [
    {
      "company": "string", "role": "string",
      "start_date": "string" | null, "end_date": "string" | null,
      "is_current": boolean, "location": "string" | null,
      "bullets": ["string"]
    }
  ],
  "education": [
    {
      "institution": "string", "degree": "string" | null, "field": "string" | null,
      "start_date": "string" | null, "end_date": "string" | null
    }
  ],
  "skills": { "technical": ["string"], "tools": ["string"], "soft": ["string"] },
  "projects": [
    { "name": "string", "summary": "string" | null, "bullets": ["string"], "technologies": ["string"] }
  ],
  "certifications": [
    { "name": "string", "issuer": "string" | null, "issue_date": "string" | null }
  ]
}

Use null or [] for anything the resume does not state."#;
