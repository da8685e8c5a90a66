//! Built-in tutor personas and practice scenarios. The concatenated prompts
//! become the session's system instruction.

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub description: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub description: String,
    pub prompt: String,
}

/// System instruction for a session: persona prompt followed by the
/// scenario prompt.
pub fn system_instruction(persona: &Persona, scenario: &Scenario) -> String {
    format!("{} {}", persona.prompt, scenario.prompt)
}

pub fn builtin_personas() -> Vec<Persona> {
    vec![
        Persona {
            id: "beginner".to_string(),
            name: "Principiante (Ana)".to_string(),
            description: "Practica conversaciones básicas en un espacio seguro y sin juicios."
                .to_string(),
            prompt: "You are a friendly and patient English tutor for a Spanish-speaking \
                     beginner. Your name is Alex. Speak slowly and clearly. Use simple \
                     vocabulary and short sentences. After I speak, gently correct any major \
                     grammatical mistakes I made and then continue the conversation. Ask \
                     simple, open-ended questions to encourage me to talk."
                .to_string(),
        },
        Persona {
            id: "intermediate".to_string(),
            name: "Intermedio (Carlos)".to_string(),
            description: "Mejora tu fluidez y amplía tu vocabulario profesional.".to_string(),
            prompt: "You are an English language coach for an intermediate Spanish-speaking \
                     professional. Your name is Alex. The user wants to improve their business \
                     English. Engage in professional conversations. After I speak, correct my \
                     grammatical errors and suggest more natural or professional-sounding \
                     alternative phrases. Help me expand my business vocabulary."
                .to_string(),
        },
        Persona {
            id: "advanced".to_string(),
            name: "Avanzado (Sofía)".to_string(),
            description: "Pule tu pronunciación y aprende expresiones naturales y coloquiales."
                .to_string(),
            prompt: "You are a language exchange partner for an advanced English learner from \
                     a Spanish-speaking background. Your name is Alex. Speak at a normal, \
                     natural pace. Use common idioms and colloquialisms. The user wants to \
                     sound more like a native speaker. After I speak, point out any subtle \
                     errors in grammar or word choice and suggest more natural phrasing. Feel \
                     free to discuss complex topics."
                .to_string(),
        },
    ]
}

pub fn builtin_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            id: "free-talk".to_string(),
            name: "Conversación Libre".to_string(),
            description: "Habla de cualquier tema que te interese.".to_string(),
            prompt: "Start a free-flowing, general conversation. Begin by asking me how my \
                     day is going."
                .to_string(),
        },
        Scenario {
            id: "cafe-order".to_string(),
            name: "Pedir en una Cafetería".to_string(),
            description: "Practica cómo ordenar comida y bebida.".to_string(),
            prompt: "You are a barista in a coffee shop. I am a customer. Start the \
                     conversation by greeting me and asking for my order."
                .to_string(),
        },
        Scenario {
            id: "job-interview".to_string(),
            name: "Entrevista de Trabajo".to_string(),
            description: "Simula una entrevista para un puesto de trabajo.".to_string(),
            prompt: "You are a hiring manager interviewing me for a job. I am the candidate. \
                     Start the interview by saying: \"Thanks for coming in today. Can you \
                     tell me a little bit about yourself?\""
                .to_string(),
        },
        Scenario {
            id: "directions".to_string(),
            name: "Preguntar Direcciones".to_string(),
            description: "Practica cómo pedir y dar indicaciones en una ciudad.".to_string(),
            prompt: "You are a local person on a street corner. I am a tourist who is lost. \
                     I will ask you for directions. You should start by asking me \"Can I \
                     help you?\"."
                .to_string(),
        },
    ]
}
