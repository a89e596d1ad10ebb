//! Opcode and interrupt words.
//!
//! Both are encoded as `(id << 2) | arity`, where `arity` is the number of
//! register operands the interpreter reads before dispatching. Any further
//! operands are read by the instruction itself.

/// Largest number of leading register operands.
pub const MAX_ARITY: usize = 3;

const ARITY_BITS: u32 = 2;
const ARITY_MASK: u32 = (1 << ARITY_BITS) - 1;

const fn encode(arity: u32, id: u32) -> u32 {
    (id << ARITY_BITS) | arity
}

macro_rules! word_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = ($arity:expr, $id:expr) => $mnemonic:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = encode($arity, $id), )+
        }

        impl $name {
            /// Every variant.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            const TABLE: [Option<$name>; 128] = {
                let mut table = [None; 128];
                let mut i = 0;
                while i < Self::ALL.len() {
                    table[Self::ALL[i] as usize] = Some(Self::ALL[i]);
                    i += 1;
                }
                table
            };

            /// Decodes a word, returning `None` for unassigned values.
            #[inline]
            pub fn decode(word: u32) -> Option<$name> {
                Self::TABLE.get(word as usize).copied().flatten()
            }

            /// The word this variant is stored as.
            #[inline]
            pub fn word(self) -> u32 {
                self as u32
            }

            /// Number of register operands read up front.
            #[inline]
            pub fn arity(self) -> usize {
                (self as u32 & ARITY_MASK) as usize
            }

            /// Upper-case mnemonic.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( $name::$variant => $mnemonic, )+
                }
            }
        }
    };
}

word_enum! {
    /// Instructions of the register machine.
    pub enum Opcode {
        /// `[]`
        Noop = (0, 1) => "NOOP",
        /// `[SRC, DST]`
        Mov = (1, 0) => "MOV",
        /// `[INTERRUPT, ...]`
        Int = (0, 2) => "INT",
        /// `[POS]`
        Jmp = (0, 3) => "JMP",
        /// `[CND, POS]`
        JmpTrue = (1, 1) => "JMP_TRUE",
        /// `[CND, POS]`
        JmpFalse = (1, 2) => "JMP_FALSE",
        /// `[FN, N, ARG*N, DST]`
        Call = (1, 4) => "CALL",
        /// `[FN, N, ARG*N, K, (NAME, ARG)*K, DST]`
        CallKw = (1, 5) => "CALL_KW",
        /// `[IDX]`
        Return = (1, 7) => "RETURN",
        /// `[POS, ERR]`
        TryCatch = (0, 5) => "TRYCATCH",
        /// `[IDX]`
        Throw = (1, 8) => "THROW",
        /// `[]`
        PopTryCatch = (0, 6) => "POPTRYCATCH",
        /// `[A, DST]`
        Not = (1, 10) => "NOT",
        /// `[A, DST]`
        Neg = (1, 11) => "NEG",
        /// `[A, B, DST]`
        Eql = (2, 0) => "EQL",
        /// `[A, B, DST]`
        Neq = (2, 1) => "NEQ",
        /// `[A, B, DST]`
        Lth = (2, 2) => "LTH",
        /// `[A, B, DST]`
        Gth = (2, 3) => "GTH",
        /// `[A, B, DST]`
        Leq = (2, 4) => "LEQ",
        /// `[A, B, DST]`
        Geq = (2, 5) => "GEQ",
        /// `[A, B, DST]`
        Cmp = (2, 6) => "CMP",
        /// `[A, B, DST]`
        Add = (2, 7) => "ADD",
        /// `[A, B, DST]`
        Sub = (2, 8) => "SUB",
        /// `[A, B, DST]`
        Mul = (2, 9) => "MUL",
        /// `[A, B, DST]`
        Div = (2, 10) => "DIV",
        /// `[A, B, DST]`
        Mod = (2, 11) => "MOD",
        /// `[A, B, DST]`
        Pow = (2, 12) => "POW",
        /// `[A, B, DST]`
        Index = (2, 13) => "INDEX",
        /// `[A, B, C]`
        IndexAssign = (3, 0) => "INDEX_ASSIGN",
        /// `[A, B, DST]`
        Matches = (2, 14) => "MATCHES",
        /// `[A, B, DST]`
        PatAnd = (2, 15) => "PAT_AND",
        /// `[A, B, DST]`
        PatOr = (2, 16) => "PAT_OR",
        /// `[A, DST]`
        PatNot = (1, 9) => "PAT_NOT",
        /// `[CNST, DST]`
        CLoad = (0, 9) => "CLOAD",
        /// `[GLBL, DST]`
        GLoad = (0, 10) => "GLOAD",
        /// `[SRC, GLBL]`
        GStore = (1, 12) => "GSTORE",
        /// `[A, CNST, DST]`
        ILoad = (1, 6) => "ILOAD",
        /// `[A, C, CNST]`
        IStore = (2, 17) => "ISTORE",
        /// `[A, B, IDX]`
        FeGenusStore = (2, 18) => "FEGENUS_STORE",
        /// `[A, B, IDX]`
        FmGenusStore = (2, 19) => "FMGENUS_STORE",
    }
}

word_enum! {
    /// Host services reached through [`Opcode::Int`].
    pub enum Interrupt {
        /// `[A, DST]`
        ToNumeral = (1, 1) => "TONUMERAL",
        /// `[A, DST]`
        ToText = (1, 2) => "TOTEXT",
        /// `[A, DST]`
        ToVeracity = (1, 3) => "TOVERACITY",
        /// `[A, DST]`
        ToBook = (1, 4) => "TOBOOK",
        /// `[A, DST]`
        ToCodex = (1, 5) => "TOCODEX",
        /// `[A, DST]`
        Kindof = (1, 6) => "KINDOF",
        /// `[A, DST]`
        Length = (1, 7) => "LENGTH",
        /// `[A, DST]`
        Arabic = (1, 8) => "ARABIC",
        /// `[A, DST]`
        Roman = (1, 9) => "ROMAN",
        /// `[A, DST]`
        Print = (1, 10) => "PRINT",
        /// `[A, DST]`
        Println = (1, 11) => "PRINTLN",
        /// `[A, DST]`
        Dump = (1, 12) => "DUMP",
        /// `[CMD, DST]`
        System = (1, 13) => "SYSTEM",
        /// `[CODE]`
        Exit = (1, 14) => "EXIT",
        /// `[A, DST]`
        Ascii = (1, 16) => "ASCII",
        /// `[DST]`
        Prompt = (0, 0) => "PROMPT",
        /// `[DST]`
        Random = (0, 1) => "RANDOM",
        /// `[N, (K, V)*N, DST]`
        CodexNew = (0, 2) => "CODEX_NEW",
        /// `[N, V*N, DST]`
        BookNew = (0, 3) => "BOOK_NEW",
        /// `[A, START, COUNT, DST]`
        Substr = (3, 0) => "SUBSTR",
        /// `[BOOK, IDX, V, DST]`
        ArrayInsert = (3, 1) => "ARRAY_INSERT",
        /// `[A, KEY, DST]`
        ArrayDelete = (2, 0) => "ARRAY_DELETE",
        /// `[EXEC, STDIN, N, ARG*N, DST]`
        Babel = (2, 2) => "BABEL",
        /// `[FILENAME, MODE, DST]`
        Fopen = (2, 3) => "FOPEN",
    }
}
