//! The static text table of the DOS release.
//!
//! Bytecode refers to text by numeric id only; the strings were compiled
//! into the original executable rather than stored in the banks.

use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    static ref STRINGS: HashMap<u16, &'static str> = {
        let mut m = HashMap::new();
        m.insert(0x001, "P E A N U T  3000");
        m.insert(
            0x002,
            "Copyright  } 1990 Peanut Computer, Inc.\nAll rights reserved.\n\nCHAPAL v3.3",
        );
        m.insert(0x003, "2");
        m.insert(0x004, "3");
        m.insert(0x005, ".");
        m.insert(0x006, "A");
        m.insert(0x007, "@");
        m.insert(0x008, "PEANUT 3000");
        m.insert(0x00A, "R");
        m.insert(0x00B, "U");
        m.insert(0x00C, "N");
        m.insert(0x00D, "P");
        m.insert(0x00E, "R");
        m.insert(0x00F, "O");
        m.insert(0x010, "J");
        m.insert(0x011, "E");
        m.insert(0x012, "C");
        m.insert(0x013, "T");
        m.insert(0x014, "Shield 9A.5f Ok");
        m.insert(0x015, "Flux % 5.0177 Ok");
        m.insert(0x016, "CDI Vector ok");
        m.insert(0x017, " %%%ddd ok");
        m.insert(0x018, "Race-Track ok");
        m.insert(0x019, "SYNCHROTRON");
        m.insert(
            0x01A,
            "E: 23%\ng: .005\n\nRK: 77.2L\n\nopt: g+\n\n Shield:\n1: OFF\n2: ON\n3: ON\n\nP~: 1\n",
        );
        m.insert(0x01B, "ON");
        m.insert(0x01C, "-");
        m.insert(0x021, "|");
        m.insert(0x022, "--- Theoretical study ---");
        m.insert(0x023, " THE EXPERIMENT ");
        m.insert(0x024, "23552");
        m.insert(0x025, "40036");
        m.insert(0x026, "95");
        m.insert(0x027, "250");
        m.insert(0x028, "40036");
        m.insert(0x029, "95");
        m.insert(0x02A, "250");
        m.insert(0x031, "Processing data...");
        m.insert(0x032, "Run experiment...");
        m.insert(
            0x035,
            "RESULT:\nProbability of creating:\n ANTIMATTER: 91.V %\n NEUTRINO 27:  0.04 %\n NEUTRINO 424: 18 %\n",
        );
        m.insert(0x036, "   Practical verification Y/N ?");
        m.insert(0x037, "SURE ?");
        m.insert(
            0x038,
            "MODIFICATION OF PARAMETERS\nRELATING TO PARTICLE\nACCELERATOR (SYNCHROTRON).",
        );
        m.insert(0x039, "       RUN EXPERIMENT ?");
        m.insert(0x03C, "t---t");
        m.insert(0x03D, "000 ~");
        m.insert(0x03E, ".20x14dd");
        m.insert(0x03F, "gj5r5r");
        m.insert(0x040, "tilgor 25%");
        m.insert(0x041, "12% 33% checked");
        m.insert(0x042, "D=4.2158005584");
        m.insert(0x043, "d=10.00001");
        m.insert(0x044, "+");
        m.insert(0x045, "*");
        m.insert(0x046, "% 304");
        m.insert(0x047, "gurgle 21");
        m.insert(0x048, "{{{{");
        m.insert(0x049, "Delphine Software");
        m.insert(0x04A, "By Eric Chahi");
        m.insert(0x04B, "  5");
        m.insert(0x04C, "  17");
        m.insert(0x12C, "0");
        m.insert(0x12D, "1");
        m.insert(0x12E, "2");
        m.insert(0x12F, "3");
        m.insert(0x130, "4");
        m.insert(0x131, "5");
        m.insert(0x132, "6");
        m.insert(0x133, "7");
        m.insert(0x134, "8");
        m.insert(0x135, "9");
        m.insert(0x136, "A");
        m.insert(0x137, "B");
        m.insert(0x138, "C");
        m.insert(0x139, "D");
        m.insert(0x13A, "E");
        m.insert(0x13B, "F");
        m.insert(0x13D, "=");
        m.insert(0x13E, "*");
        m.insert(0x140, "?");
        m.insert(0x141, "BRAVO");
        m.insert(0x142, "GAME OVER");
        m.insert(0x143, "CODE:");
        m.insert(0x144, "FAIL");
        m.insert(0x145, "ACCESS CODE:");
        m.insert(0x146, "PRESS BUTTON OR RETURN TO CONTINUE");
        m.insert(0x147, "   ENTER ACCESS CODE");
        m.insert(0x148, "   INVALID PASSWORD !");
        m.insert(0x149, "ANNULER");
        m.insert(
            0x14A,
            "      INSERT DISK ?\n\n\n\n\n\n\n\nPRESS ANY KEY TO CONTINUE",
        );
        m.insert(
            0x14B,
            " SELECT SYMBOLS CORRESPONDING TO\n THE POSITION\n ON THE CODE WHEEL",
        );
        m.insert(0x14C, "    LOADING...");
        m.insert(0x14D, "              ERROR");
        m.insert(0x15E, "LDKD");
        m.insert(0x15F, "HTDC");
        m.insert(0x160, "CLLD");
        m.insert(0x161, "FXLC");
        m.insert(0x162, "KRFK");
        m.insert(0x163, "XDDJ");
        m.insert(0x164, "LBKG");
        m.insert(0x165, "KLFB");
        m.insert(0x166, "TTCT");
        m.insert(0x167, "DDRX");
        m.insert(0x168, "TBHK");
        m.insert(0x169, "BRTD");
        m.insert(0x16A, "CKJL");
        m.insert(0x16B, "LFCK");
        m.insert(0x16C, "BFLX");
        m.insert(0x16D, "XJRT");
        m.insert(0x16E, "HRTB");
        m.insert(0x16F, "HBHK");
        m.insert(0x170, "JCGB");
        m.insert(0x171, "HHFL");
        m.insert(0x172, "TFBB");
        m.insert(0x173, "TXHF");
        m.insert(0x174, "JHJL");
        m.insert(0x181, " BY");
        m.insert(0x182, "ERIC CHAHI");
        m.insert(0x183, "         MUSIC AND SOUND EFFECTS");
        m.insert(0x184, " ");
        m.insert(0x185, "JEAN-FRANCOIS FREITAS");
        m.insert(0x186, "IBM PC VERSION");
        m.insert(0x187, "      BY");
        m.insert(0x188, " DANIEL MORAIS");
        m.insert(0x18B, "       THEN PRESS FIRE");
        m.insert(0x18C, " PUT THE PADDLE ON THE UPPER LEFT CORNER");
        m.insert(0x18D, " PUT THE PADDLE IN CENTRAL POSITION");
        m.insert(0x18E, " PUT THE PADDLE ON THE LOWER RIGHT CORNER");
        m.insert(0x258, "      Designed by ..... Eric Chahi");
        m.insert(0x259, "    Programmed by...... Eric Chahi");
        m.insert(0x25A, "      Artwork ......... Eric Chahi");
        m.insert(0x25B, "Music by ........ Jean-francois Freitas");
        m.insert(0x25C, "            Sound effects");
        m.insert(0x25D, "        Jean-Francois Freitas\nEric Chahi");
        m.insert(0x263, "              Thanks to");
        m.insert(
            0x264,
            "           Jesus Martinez\n\n          Daniel Morais\n\n        Frederic Savoir\n\n      Cecile Chahi\n\n    Philippe Delamarre\n\n  Philippe Ulrich\n\nSebastien Berthet\n\nPierre Gousseau",
        );
        m.insert(0x265, "Now Go Out Of This World");
        m
    };
}

/// Look up the text for a string id.
pub fn lookup(id: u16) -> Option<&'static str> {
    STRINGS.get(&id).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ids_resolve() {
        assert_eq!(lookup(0x142), Some("GAME OVER"));
        assert_eq!(lookup(0x15E), Some("LDKD"));
    }

    #[test]
    fn unknown_id_is_absent() {
        assert_eq!(lookup(0xFFFF), None);
    }
}
